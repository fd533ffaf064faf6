//! Position Book: open leveraged positions of one pool.
//!
//! Limits arrive as [`PositionLimits`] values and pool capital as plain
//! numbers; the book never calls the risk manager or the ledger. Margin moves
//! between the ledger's available and locked capital are the caller's job,
//! using the `margin_released` / `initial_margin` figures reported here.
//!
//! Mark-to-market only touches per-position fields and reports which
//! positions crossed a liquidation, stop-loss or take-profit level. Acting on
//! a [`Trigger`] (close + settle) is done by the caller under the pool lock.

use std::collections::BTreeMap;

use aqc_schemas::{
    CloseReason, DecisionId, OpenPositionView, PoolId, PositionId, PositionSide, PriceMap,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Limits injected from the pool's risk profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLimits {
    /// Max margin of one position, percent of pool capital.
    pub max_position_pct: Decimal,
    pub max_leverage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub pool_id: PoolId,
    /// Decision that opened the position; its outcome is back-filled on close.
    pub decision_id: Option<DecisionId>,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub quantity: Decimal,
    pub leverage: Decimal,
    /// `quantity * current_price`
    pub notional_value: Decimal,
    /// `notional_value / leverage`
    pub margin_used: Decimal,
    /// Margin locked in the ledger at open; released on close.
    pub initial_margin: Decimal,
    pub unrealized_pnl: Decimal,
    /// Percent of initial margin.
    pub unrealized_pnl_pct: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub liquidation_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub close_reason: Option<CloseReason>,
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// P&L of `quantity` units exited at `price`.
    pub fn pnl_at(&self, price: Decimal, quantity: Decimal) -> Decimal {
        quantity * (price - self.entry_price) * self.side.sign()
    }

    fn remark(&mut self, price: Decimal) {
        self.current_price = price;
        self.notional_value = self.quantity * price;
        self.margin_used = if self.leverage > Decimal::ZERO {
            self.notional_value / self.leverage
        } else {
            self.notional_value
        };
        self.unrealized_pnl = self.pnl_at(price, self.quantity);
        self.unrealized_pnl_pct = if self.initial_margin > Decimal::ZERO {
            (self.unrealized_pnl / self.initial_margin * Decimal::ONE_HUNDRED).round_dp(4)
        } else {
            Decimal::ZERO
        };
    }

    /// First threshold crossed at the current price. Liquidation wins over
    /// stop-loss, stop-loss over take-profit.
    fn crossed(&self) -> Option<CloseReason> {
        let p = self.current_price;
        match self.side {
            PositionSide::Long => {
                if p <= self.liquidation_price {
                    Some(CloseReason::RiskLiquidation)
                } else if self.stop_loss.is_some_and(|s| p <= s) {
                    Some(CloseReason::StopLoss)
                } else if self.take_profit.is_some_and(|t| p >= t) {
                    Some(CloseReason::TakeProfit)
                } else {
                    None
                }
            }
            PositionSide::Short => {
                if p >= self.liquidation_price {
                    Some(CloseReason::RiskLiquidation)
                } else if self.stop_loss.is_some_and(|s| p >= s) {
                    Some(CloseReason::StopLoss)
                } else if self.take_profit.is_some_and(|t| p <= t) {
                    Some(CloseReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }

    pub fn view(&self) -> OpenPositionView {
        OpenPositionView {
            position_id: self.id,
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
            current_price: self.current_price,
            unrealized_pnl: self.unrealized_pnl,
        }
    }
}

/// Outcome of a pre-trade sizing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SizingVerdict {
    Fits { margin: Decimal },
    ExceedsPositionLimit { margin: Decimal, limit: Decimal },
    InsufficientCapital { margin: Decimal, capacity: Decimal },
    LeverageAboveLimit { leverage: Decimal, max: Decimal },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("quantity must be > 0, got {0}")]
    NonPositiveQuantity(Decimal),
    #[error("price must be > 0, got {0}")]
    NonPositivePrice(Decimal),
    #[error("leverage must be >= 1, got {0}")]
    InvalidLeverage(Decimal),
    #[error("{0}")]
    InvalidBracket(String),
    #[error("margin {margin} exceeds position limit {limit}")]
    ExceedsPositionLimit { margin: Decimal, limit: Decimal },
    #[error("margin {margin} exceeds capital capacity {capacity}")]
    InsufficientCapital { margin: Decimal, capacity: Decimal },
    #[error("leverage {leverage} above max {max}")]
    LeverageAboveLimit { leverage: Decimal, max: Decimal },
    #[error("position {0} not found or already closed")]
    PositionNotFound(PositionId),
}

/// Close instruction produced by mark-to-market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub position_id: PositionId,
    pub symbol: String,
    pub reason: CloseReason,
    /// Mark at which the threshold was crossed; used as the exit price.
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkReport {
    pub marked: usize,
    /// Aggregate unrealized P&L of all open positions after marking.
    pub unrealized_pnl: Decimal,
    pub triggers: Vec<Trigger>,
    /// Open symbols with no price in the tick; left at their previous mark.
    pub missing_symbols: Vec<String>,
}

/// Result of closing (all or part of) a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClose {
    pub position_id: PositionId,
    pub decision_id: Option<DecisionId>,
    pub quantity: Decimal,
    pub exit_price: Decimal,
    pub reason: CloseReason,
    pub realized_pnl: Decimal,
    pub margin_released: Decimal,
    /// True when nothing of the position remains open.
    pub fully_closed: bool,
}

#[derive(Debug, Clone)]
pub struct PositionBook {
    pool_id: PoolId,
    maintenance_margin_buffer: Decimal,
    open: BTreeMap<PositionId, Position>,
    closed: Vec<Position>,
}

impl PositionBook {
    pub fn new(pool_id: PoolId, maintenance_margin_buffer: Decimal) -> Self {
        Self {
            pool_id,
            maintenance_margin_buffer,
            open: BTreeMap::new(),
            closed: Vec::new(),
        }
    }

    /// Rebuild from persisted positions; closed ones go to history.
    pub fn restore(pool_id: PoolId, maintenance_margin_buffer: Decimal, positions: Vec<Position>) -> Self {
        let mut book = Self::new(pool_id, maintenance_margin_buffer);
        for p in positions {
            if p.is_open() {
                book.open.insert(p.id, p);
            } else {
                book.closed.push(p);
            }
        }
        book
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.open.get(&id)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn open_for_symbol(&self, symbol: &str) -> Vec<&Position> {
        self.open.values().filter(|p| p.symbol == symbol).collect()
    }

    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut s: Vec<String> = self.open.values().map(|p| p.symbol.clone()).collect();
        s.sort();
        s.dedup();
        s
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.open.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Sum of open notional at the last mark.
    pub fn gross_exposure(&self) -> Decimal {
        self.open.values().map(|p| p.notional_value).sum()
    }

    pub fn views(&self) -> Vec<OpenPositionView> {
        self.open.values().map(Position::view).collect()
    }

    /// `entry * (1 - buffer/leverage)` for longs, `entry * (1 + buffer/leverage)` for shorts.
    pub fn liquidation_price(&self, side: PositionSide, entry_price: Decimal, leverage: Decimal) -> Decimal {
        let distance = self.maintenance_margin_buffer / leverage;
        entry_price * (Decimal::ONE - side.sign() * distance)
    }

    /// Pre-trade sizing against injected limits. Business limits come back as
    /// verdicts, never errors.
    pub fn check_open(
        &self,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: Decimal,
        pool_capital: Decimal,
        margin_capacity: Decimal,
        limits: &PositionLimits,
    ) -> SizingVerdict {
        let margin = if leverage > Decimal::ZERO {
            quantity * entry_price / leverage
        } else {
            quantity * entry_price
        };
        if leverage > limits.max_leverage {
            return SizingVerdict::LeverageAboveLimit {
                leverage,
                max: limits.max_leverage,
            };
        }
        let limit = pool_capital * limits.max_position_pct / Decimal::ONE_HUNDRED;
        if margin > limit {
            return SizingVerdict::ExceedsPositionLimit { margin, limit };
        }
        if margin > margin_capacity {
            return SizingVerdict::InsufficientCapital {
                margin,
                capacity: margin_capacity,
            };
        }
        SizingVerdict::Fits { margin }
    }

    /// Open a position from a fill. Re-runs the sizing check; the caller
    /// moves `initial_margin` into the ledger's locked capital.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        decision_id: Option<DecisionId>,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        pool_capital: Decimal,
        margin_capacity: Decimal,
        limits: &PositionLimits,
        now: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        if symbol.trim().is_empty() {
            return Err(PositionError::EmptySymbol);
        }
        if quantity <= Decimal::ZERO {
            return Err(PositionError::NonPositiveQuantity(quantity));
        }
        if entry_price <= Decimal::ZERO {
            return Err(PositionError::NonPositivePrice(entry_price));
        }
        if leverage < Decimal::ONE {
            return Err(PositionError::InvalidLeverage(leverage));
        }
        validate_bracket(side, entry_price, stop_loss, take_profit)?;

        let margin = match self.check_open(
            quantity,
            entry_price,
            leverage,
            pool_capital,
            margin_capacity,
            limits,
        ) {
            SizingVerdict::Fits { margin } => margin,
            SizingVerdict::ExceedsPositionLimit { margin, limit } => {
                return Err(PositionError::ExceedsPositionLimit { margin, limit })
            }
            SizingVerdict::InsufficientCapital { margin, capacity } => {
                return Err(PositionError::InsufficientCapital { margin, capacity })
            }
            SizingVerdict::LeverageAboveLimit { leverage, max } => {
                return Err(PositionError::LeverageAboveLimit { leverage, max })
            }
        };

        let mut position = Position {
            id: PositionId::new(),
            pool_id: self.pool_id,
            decision_id,
            symbol: symbol.to_string(),
            side,
            entry_price,
            current_price: entry_price,
            quantity,
            leverage,
            notional_value: Decimal::ZERO,
            margin_used: Decimal::ZERO,
            initial_margin: margin,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            stop_loss,
            take_profit,
            liquidation_price: self.liquidation_price(side, entry_price, leverage),
            opened_at: now,
            closed_at: None,
            exit_price: None,
            close_reason: None,
            realized_pnl: None,
        };
        position.remark(entry_price);
        self.open.insert(position.id, position.clone());
        Ok(position)
    }

    /// Update marks from a price tick and report crossed thresholds.
    pub fn mark_to_market(&mut self, prices: &PriceMap) -> MarkReport {
        let mut report = MarkReport::default();
        for p in self.open.values_mut() {
            match prices.get(&p.symbol) {
                Some(price) if *price > Decimal::ZERO => {
                    p.remark(*price);
                    report.marked += 1;
                    if let Some(reason) = p.crossed() {
                        report.triggers.push(Trigger {
                            position_id: p.id,
                            symbol: p.symbol.clone(),
                            reason,
                            price: *price,
                        });
                    }
                }
                _ => report.missing_symbols.push(p.symbol.clone()),
            }
        }
        report.missing_symbols.sort();
        report.missing_symbols.dedup();
        report.unrealized_pnl = self.unrealized_pnl();
        report
    }

    /// Close the whole position.
    pub fn close(
        &mut self,
        position_id: PositionId,
        exit_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<PositionClose, PositionError> {
        let quantity = self
            .open
            .get(&position_id)
            .map(|p| p.quantity)
            .ok_or(PositionError::PositionNotFound(position_id))?;
        self.close_quantity(position_id, quantity, exit_price, reason, now)
    }

    /// Close `quantity` units. Realized P&L and released margin are pro rata;
    /// closing the full quantity (or more) closes the position.
    pub fn close_quantity(
        &mut self,
        position_id: PositionId,
        quantity: Decimal,
        exit_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<PositionClose, PositionError> {
        if quantity <= Decimal::ZERO {
            return Err(PositionError::NonPositiveQuantity(quantity));
        }
        if exit_price <= Decimal::ZERO {
            return Err(PositionError::NonPositivePrice(exit_price));
        }
        let position = self
            .open
            .get_mut(&position_id)
            .ok_or(PositionError::PositionNotFound(position_id))?;

        let qty = quantity.min(position.quantity);
        let realized = position.pnl_at(exit_price, qty);
        let fully_closed = qty == position.quantity;
        let margin_released = if fully_closed {
            position.initial_margin
        } else {
            position.initial_margin * qty / position.quantity
        };

        let out = PositionClose {
            position_id,
            decision_id: position.decision_id,
            quantity: qty,
            exit_price,
            reason,
            realized_pnl: realized,
            margin_released,
            fully_closed,
        };

        if fully_closed {
            if let Some(mut p) = self.open.remove(&position_id) {
                p.remark(exit_price);
                p.unrealized_pnl = Decimal::ZERO;
                p.unrealized_pnl_pct = Decimal::ZERO;
                p.closed_at = Some(now);
                p.exit_price = Some(exit_price);
                p.close_reason = Some(reason);
                p.realized_pnl = Some(p.realized_pnl.unwrap_or(Decimal::ZERO) + realized);
                self.closed.push(p);
            }
        } else {
            position.quantity -= qty;
            position.initial_margin -= margin_released;
            position.realized_pnl = Some(position.realized_pnl.unwrap_or(Decimal::ZERO) + realized);
            position.remark(exit_price);
        }
        Ok(out)
    }
}

fn validate_bracket(
    side: PositionSide,
    entry: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Result<(), PositionError> {
    let (stop_ok, take_ok) = match side {
        PositionSide::Long => (
            stop_loss.map_or(true, |s| s > Decimal::ZERO && s < entry),
            take_profit.map_or(true, |t| t > entry),
        ),
        PositionSide::Short => (
            stop_loss.map_or(true, |s| s > entry),
            take_profit.map_or(true, |t| t > Decimal::ZERO && t < entry),
        ),
    };
    if !stop_ok {
        return Err(PositionError::InvalidBracket(format!(
            "stop loss {:?} is on the wrong side of entry {entry} for {side}",
            stop_loss
        )));
    }
    if !take_ok {
        return Err(PositionError::InvalidBracket(format!(
            "take profit {:?} is on the wrong side of entry {entry} for {side}",
            take_profit
        )));
    }
    Ok(())
}
