//! Pool Ledger: authoritative share/NAV accounting for one pool.
//!
//! # Write surface
//! `open_subscription`, `top_up`, `settle_trade`, `apply_unrealized`,
//! `reserve_margin`, `release_margin`, `redeem`, `liquidate`. Nothing else in
//! the workspace writes `current_nav_per_share` or `total_shares_outstanding`.
//!
//! # Invariants (checked after every mutation)
//! - `total_capital == available_capital + locked_capital`
//! - `sum(order shares) == total_shares_outstanding` (±1 share unit)
//! - `nav * shares ≈ total_capital + realized_pnl + unrealized_pnl` while shares > 0
//!
//! A breach freezes the pool and is returned as
//! [`LedgerError::InvariantViolation`]. Validation failures return before any
//! field is touched.

use std::collections::BTreeMap;
use std::fmt;

use aqc_schemas::{OrderId, PoolId, StrategyId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{InvestmentOrder, LedgerParams, OrderShare, Pool, PoolStatus};
use crate::{floor_shares, round_scaled, OrderStatus, OrderTransitionError, SHARE_SCALE};

/// One share unit at `SHARE_SCALE`.
fn share_unit() -> Decimal {
    Decimal::new(1, SHARE_SCALE)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("pool {0} is frozen")]
    PoolFrozen(PoolId),
    #[error("pool {0} is not frozen")]
    NotFrozen(PoolId),
    #[error("amount {amount} is below the pool minimum {minimum}")]
    InsufficientAmount { amount: Decimal, minimum: Decimal },
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    IllegalTransition(#[from] OrderTransitionError),
    #[error("NAV per share is not positive: {0}")]
    NavNotPositive(Decimal),
    #[error("insufficient capital: requested {requested}, capacity {capacity}")]
    InsufficientCapital { requested: Decimal, capacity: Decimal },
    #[error("insufficient liquidity for payout: required {required}, available {available}")]
    InsufficientLiquidity { required: Decimal, available: Decimal },
    #[error("pool invariant violated: {0}")]
    InvariantViolation(InvariantBreach),
}

/// Which ledger invariant failed, with the offending values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvariantBreach {
    CapitalSplit {
        total: Decimal,
        available: Decimal,
        locked: Decimal,
    },
    ShareSum {
        outstanding: Decimal,
        sum_of_orders: Decimal,
    },
    NavMismatch {
        nav: Decimal,
        shares: Decimal,
        value: Decimal,
    },
    NegativeBalance {
        field: String,
        value: Decimal,
    },
    MarginUnderflow {
        release: Decimal,
        locked: Decimal,
    },
}

impl fmt::Display for InvariantBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapitalSplit {
                total,
                available,
                locked,
            } => write!(
                f,
                "total_capital {total} != available {available} + locked {locked}"
            ),
            Self::ShareSum {
                outstanding,
                sum_of_orders,
            } => write!(
                f,
                "shares outstanding {outstanding} != sum of order shares {sum_of_orders}"
            ),
            Self::NavMismatch { nav, shares, value } => write!(
                f,
                "nav {nav} * shares {shares} does not reconcile with pool value {value}"
            ),
            Self::NegativeBalance { field, value } => write!(f, "{field} is negative: {value}"),
            Self::MarginUnderflow { release, locked } => {
                write!(f, "release of {release} exceeds locked capital {locked}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Redemption result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redemption {
    pub order_id: OrderId,
    pub shares_redeemed: Decimal,
    pub nav_per_share: Decimal,
    /// `shares_redeemed * nav_per_share`
    pub gross_amount: Decimal,
    pub penalty: Decimal,
    /// Paid to the investor: gross minus penalty.
    pub redemption_amount: Decimal,
    pub early: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitKind {
    Redeem,
    Liquidate,
}

// ---------------------------------------------------------------------------
// PoolLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PoolLedger {
    pool: Pool,
    orders: BTreeMap<OrderId, InvestmentOrder>,
    shares: BTreeMap<OrderId, OrderShare>,
    params: LedgerParams,
}

impl PoolLedger {
    /// Fresh pool for a newly activated strategy.
    pub fn new(
        pool_id: PoolId,
        strategy_id: StrategyId,
        params: LedgerParams,
        now: DateTime<Utc>,
    ) -> Self {
        let pool = Pool {
            id: pool_id,
            strategy_id,
            status: PoolStatus::Active,
            frozen_reason: None,
            total_capital: Decimal::ZERO,
            available_capital: Decimal::ZERO,
            locked_capital: Decimal::ZERO,
            current_nav_per_share: params.initial_nav_per_share,
            total_shares_outstanding: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            win_rate: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
            created_at: now,
            updated_at: now,
        };
        Self {
            pool,
            orders: BTreeMap::new(),
            shares: BTreeMap::new(),
            params,
        }
    }

    /// Rebuild from persisted rows. Invariants are checked immediately; a
    /// mismatch leaves the ledger frozen rather than refusing to load it, so an
    /// operator can inspect and reconcile.
    pub fn restore(
        pool: Pool,
        orders: Vec<InvestmentOrder>,
        shares: Vec<OrderShare>,
        params: LedgerParams,
    ) -> Self {
        let mut ledger = Self {
            pool,
            orders: orders.into_iter().map(|o| (o.id, o)).collect(),
            shares: shares.into_iter().map(|s| (s.order_id, s)).collect(),
            params,
        };
        if let Err(breach) = ledger.verify() {
            ledger.freeze(format!("restore: {breach}"));
        }
        ledger
    }

    // -- reads --------------------------------------------------------------

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool.id
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub fn order(&self, order_id: OrderId) -> Option<&InvestmentOrder> {
        self.orders.get(&order_id)
    }

    pub fn share(&self, order_id: OrderId) -> Option<&OrderShare> {
        self.shares.get(&order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &InvestmentOrder> {
        self.orders.values()
    }

    pub fn shares(&self) -> impl Iterator<Item = &OrderShare> {
        self.shares.values()
    }

    pub fn is_frozen(&self) -> bool {
        self.pool.is_frozen()
    }

    /// Capital that new margin may draw on. Realized losses shrink it;
    /// realized gains stay in NAV until redeemed.
    pub fn margin_capacity(&self) -> Decimal {
        let cap = self.pool.available_capital + self.pool.realized_pnl.min(Decimal::ZERO);
        cap.max(Decimal::ZERO)
    }

    // -- subscriptions ------------------------------------------------------

    /// Subscribe `amount` into the pool at the current NAV per share.
    pub fn open_subscription(
        &mut self,
        user_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(InvestmentOrder, OrderShare), LedgerError> {
        self.ensure_open()?;
        if amount < self.params.min_subscription || amount <= Decimal::ZERO {
            return Err(LedgerError::InsufficientAmount {
                amount,
                minimum: self.params.min_subscription,
            });
        }
        let nav = self.issuance_nav()?;
        let issued = floor_shares(amount / nav);
        if issued <= Decimal::ZERO {
            return Err(LedgerError::InsufficientAmount {
                amount,
                minimum: self.params.min_subscription,
            });
        }

        let order_id = OrderId::new();
        let status = OrderStatus::Pending.transition(OrderStatus::Active)?;
        let order = InvestmentOrder {
            id: order_id,
            user_id,
            pool_id: self.pool.id,
            invested_amount: amount,
            currency: self.params.currency.clone(),
            status,
            lock_period_end: now + self.params.lock_period(),
            realized_profit: Decimal::ZERO,
            total_fees_paid: Decimal::ZERO,
            created_at: now,
            closed_at: None,
        };
        let share = OrderShare {
            order_id,
            pool_id: self.pool.id,
            shares_owned: issued,
            avg_entry_nav: nav,
            share_percentage: Decimal::ZERO,
            total_invested: amount,
        };

        self.pool.total_capital += amount;
        self.pool.available_capital += amount;
        self.pool.total_shares_outstanding += issued;
        self.orders.insert(order_id, order);
        self.shares.insert(order_id, share);
        self.after_share_change(now);
        self.check_invariants()?;

        let order = self.order_snapshot(order_id)?;
        let share = self.share_snapshot(order_id)?;
        Ok((order, share))
    }

    /// Add capital to an existing active order at the current NAV.
    pub fn top_up(
        &mut self,
        order_id: OrderId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<OrderShare, LedgerError> {
        self.ensure_open()?;
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let status = self.order_snapshot(order_id)?.status;
        if status != OrderStatus::Active {
            return Err(OrderTransitionError {
                from: status,
                to: OrderStatus::Active,
            }
            .into());
        }
        let nav = self.issuance_nav()?;
        let issued = floor_shares(amount / nav);
        if issued <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.invested_amount += amount;
        }
        if let Some(share) = self.shares.get_mut(&order_id) {
            share.shares_owned += issued;
            share.total_invested += amount;
            share.avg_entry_nav = round_scaled(share.total_invested / share.shares_owned);
        }
        self.pool.total_capital += amount;
        self.pool.available_capital += amount;
        self.pool.total_shares_outstanding += issued;
        self.after_share_change(now);
        self.check_invariants()?;
        self.share_snapshot(order_id)
    }

    pub fn pause_order(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.set_order_status(order_id, OrderStatus::Paused, now)
    }

    pub fn resume_order(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.set_order_status(order_id, OrderStatus::Active, now)
    }

    // -- trading results ----------------------------------------------------

    /// Apply the realized P&L of one closed position and recompute NAV.
    /// Callers hold the pool's serialization lock.
    pub fn settle_trade(&mut self, realized_pnl: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_open()?;
        self.pool.realized_pnl += realized_pnl;
        self.pool.total_trades += 1;
        if realized_pnl > Decimal::ZERO {
            self.pool.winning_trades += 1;
        }
        self.pool.win_rate = (Decimal::from(self.pool.winning_trades) * Decimal::ONE_HUNDRED
            / Decimal::from(self.pool.total_trades))
        .round_dp(2);
        self.recompute_nav();
        self.pool.updated_at = now;
        self.check_invariants()
    }

    /// Publish the aggregate unrealized P&L of the pool's open positions.
    pub fn apply_unrealized(&mut self, unrealized_pnl: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.pool.unrealized_pnl = unrealized_pnl;
        self.recompute_nav();
        self.pool.updated_at = now;
        self.check_invariants()
    }

    /// Move `amount` from available to locked capital for a new position.
    pub fn reserve_margin(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_open()?;
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let capacity = self.margin_capacity();
        if amount > capacity {
            return Err(LedgerError::InsufficientCapital {
                requested: amount,
                capacity,
            });
        }
        self.pool.available_capital -= amount;
        self.pool.locked_capital += amount;
        self.pool.updated_at = now;
        self.check_invariants()
    }

    /// Return locked margin to available capital. Allowed on a frozen pool so
    /// positions can still be unwound.
    pub fn release_margin(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if amount > self.pool.locked_capital {
            let breach = InvariantBreach::MarginUnderflow {
                release: amount,
                locked: self.pool.locked_capital,
            };
            self.freeze(breach.to_string());
            return Err(LedgerError::InvariantViolation(breach));
        }
        self.pool.locked_capital -= amount;
        self.pool.available_capital += amount;
        self.pool.updated_at = now;
        self.check_invariants()
    }

    // -- exits --------------------------------------------------------------

    /// Investor redemption at the current NAV. Before `lock_period_end` an
    /// early-redemption penalty is withheld from principal.
    pub fn redeem(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<Redemption, LedgerError> {
        self.exit_order(order_id, now, ExitKind::Redeem)
    }

    /// Risk-triggered full exit at NAV. No penalty; terminal `liquidated`.
    pub fn liquidate(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<Redemption, LedgerError> {
        self.exit_order(order_id, now, ExitKind::Liquidate)
    }

    fn exit_order(
        &mut self,
        order_id: OrderId,
        now: DateTime<Utc>,
        kind: ExitKind,
    ) -> Result<Redemption, LedgerError> {
        self.ensure_open()?;
        let order = self.order_snapshot(order_id)?;
        let share = self.share_snapshot(order_id)?;

        let final_status = match kind {
            ExitKind::Redeem => order
                .status
                .transition(OrderStatus::Redeeming)?
                .transition(OrderStatus::Redeemed)?,
            ExitKind::Liquidate => order.status.transition(OrderStatus::Liquidated)?,
        };

        let nav = self.pool.current_nav_per_share;
        let shares = share.shares_owned;
        let gross = shares * nav;
        let early = kind == ExitKind::Redeem && now < order.lock_period_end;
        let penalty = if early {
            (share.total_invested * self.params.early_redemption_penalty_pct / Decimal::ONE_HUNDRED)
                .min(gross)
        } else {
            Decimal::ZERO
        };
        let net = gross - penalty;

        // The redeemed fraction of realized P&L leaves with the investor; the
        // remainder of the payout comes out of free capital.
        let fraction = if self.pool.total_shares_outstanding > Decimal::ZERO {
            shares / self.pool.total_shares_outstanding
        } else {
            Decimal::ZERO
        };
        let mut realized_debit = self.pool.realized_pnl * fraction;
        if realized_debit > net {
            realized_debit = net;
        }
        let capital_debit = net - realized_debit;
        if capital_debit > self.pool.available_capital {
            return Err(LedgerError::InsufficientLiquidity {
                required: capital_debit,
                available: self.pool.available_capital,
            });
        }

        self.pool.realized_pnl -= realized_debit;
        self.pool.total_capital -= capital_debit;
        self.pool.available_capital -= capital_debit;
        self.pool.total_shares_outstanding -= shares;

        if let Some(s) = self.shares.get_mut(&order_id) {
            s.shares_owned = Decimal::ZERO;
            s.share_percentage = Decimal::ZERO;
        }
        if let Some(o) = self.orders.get_mut(&order_id) {
            o.status = final_status;
            o.realized_profit = net - share.total_invested;
            o.total_fees_paid += penalty;
            o.closed_at = Some(now);
        }

        self.recompute_nav();
        self.after_share_change(now);
        self.check_invariants()?;

        Ok(Redemption {
            order_id,
            shares_redeemed: shares,
            nav_per_share: nav,
            gross_amount: gross,
            penalty,
            redemption_amount: net,
            early,
        })
    }

    // -- freeze / reconcile -------------------------------------------------

    pub fn freeze(&mut self, reason: impl Into<String>) {
        self.pool.status = PoolStatus::Frozen;
        self.pool.frozen_reason = Some(reason.into());
    }

    /// Operator action after manual correction: recompute derived fields and
    /// lift the freeze only if every invariant holds.
    pub fn reconcile_and_unfreeze(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if !self.is_frozen() {
            return Err(LedgerError::NotFrozen(self.pool.id));
        }
        self.recompute_nav();
        self.recompute_share_percentages();
        self.verify().map_err(LedgerError::InvariantViolation)?;
        self.pool.status = PoolStatus::Active;
        self.pool.frozen_reason = None;
        self.pool.updated_at = now;
        Ok(())
    }

    /// Check every invariant; a breach freezes the pool.
    pub fn check_invariants(&mut self) -> Result<(), LedgerError> {
        if let Err(breach) = self.verify() {
            self.freeze(breach.to_string());
            return Err(LedgerError::InvariantViolation(breach));
        }
        Ok(())
    }

    /// Pure invariant check.
    pub fn verify(&self) -> Result<(), InvariantBreach> {
        let p = &self.pool;
        for (field, value) in [
            ("available_capital", p.available_capital),
            ("locked_capital", p.locked_capital),
            ("total_shares_outstanding", p.total_shares_outstanding),
        ] {
            if value < Decimal::ZERO {
                return Err(InvariantBreach::NegativeBalance {
                    field: field.to_string(),
                    value,
                });
            }
        }
        if p.total_capital != p.available_capital + p.locked_capital {
            return Err(InvariantBreach::CapitalSplit {
                total: p.total_capital,
                available: p.available_capital,
                locked: p.locked_capital,
            });
        }
        let sum: Decimal = self.shares.values().map(|s| s.shares_owned).sum();
        if (sum - p.total_shares_outstanding).abs() > share_unit() {
            return Err(InvariantBreach::ShareSum {
                outstanding: p.total_shares_outstanding,
                sum_of_orders: sum,
            });
        }
        if p.total_shares_outstanding > Decimal::ZERO {
            let value = p.value();
            let tolerance = self.params.reconcile_tolerance + p.total_shares_outstanding * share_unit();
            if (p.current_nav_per_share * p.total_shares_outstanding - value).abs() > tolerance {
                return Err(InvariantBreach::NavMismatch {
                    nav: p.current_nav_per_share,
                    shares: p.total_shares_outstanding,
                    value,
                });
            }
        }
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.is_frozen() {
            return Err(LedgerError::PoolFrozen(self.pool.id));
        }
        Ok(())
    }

    fn issuance_nav(&self) -> Result<Decimal, LedgerError> {
        let nav = self.pool.current_nav_per_share;
        if nav <= Decimal::ZERO {
            return Err(LedgerError::NavNotPositive(nav));
        }
        Ok(nav)
    }

    fn order_snapshot(&self, order_id: OrderId) -> Result<InvestmentOrder, LedgerError> {
        self.orders
            .get(&order_id)
            .cloned()
            .ok_or(LedgerError::OrderNotFound(order_id))
    }

    fn share_snapshot(&self, order_id: OrderId) -> Result<OrderShare, LedgerError> {
        self.shares
            .get(&order_id)
            .cloned()
            .ok_or(LedgerError::OrderNotFound(order_id))
    }

    fn set_order_status(
        &mut self,
        order_id: OrderId,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        order.status = order.status.transition(to)?;
        self.pool.updated_at = now;
        Ok(())
    }

    /// NAV is only defined while shares are outstanding; with zero shares the
    /// last NAV is kept and any residual value stays in the pool.
    fn recompute_nav(&mut self) {
        let shares = self.pool.total_shares_outstanding;
        if shares > Decimal::ZERO {
            self.pool.current_nav_per_share = round_scaled(self.pool.value() / shares).max(Decimal::ZERO);
        }
    }

    fn recompute_share_percentages(&mut self) {
        let total = self.pool.total_shares_outstanding;
        for s in self.shares.values_mut() {
            s.share_percentage = if total > Decimal::ZERO {
                round_scaled(s.shares_owned * Decimal::ONE_HUNDRED / total)
            } else {
                Decimal::ZERO
            };
        }
    }

    fn after_share_change(&mut self, now: DateTime<Utc>) {
        self.recompute_nav();
        self.recompute_share_percentages();
        self.pool.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
