//! Pool registry and the per-pool single-writer state.
//!
//! Each [`PoolRuntime`] holds:
//! - `cycle`: async lock held for a whole trading cycle
//! - `ledger`: share/NAV accounting
//! - `book`: open positions (read-mostly)
//! - `risk`: daily snapshot history
//!
//! Acquire in that order and never hold a sync guard across `.await`. Admin
//! operations (subscriptions, redemptions) only take `ledger`, so they can
//! interleave with a cycle that is waiting on a venue, but never with the
//! booking step of that cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use aqc_config::{DeskSettings, PoolSettings};
use aqc_journal::Journal;
use aqc_portfolio::{
    InvestmentOrder, LedgerError, LedgerParams, MarkReport, OrderShare, Pool, PoolLedger, Position,
    PositionBook, PositionClose, PositionError, PositionLimits, Redemption, SizingVerdict,
};
use aqc_risk::{DailyRiskBook, RiskError, RiskInputSource, RiskInputs, RiskManager, RiskSnapshot};
use aqc_schemas::{
    CloseReason, Decision, DecisionId, MarketSnapshot, OrderId, PoolId, PositionId, PositionSide,
    PriceMap, StrategyId, Trade, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("pool {0} not found")]
    UnknownPool(PoolId),
    #[error("order {0} not found")]
    UnknownOrder(OrderId),
    #[error("pool {0} already registered")]
    DuplicatePool(PoolId),
    #[error("invalid pool: {0}")]
    InvalidPool(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// Static description of a pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSpec {
    pub pool_id: PoolId,
    pub strategy_id: StrategyId,
    pub risk_profile: String,
    /// Symbols the strategy may trade.
    pub symbols: Vec<String>,
}

impl From<&PoolSettings> for PoolSpec {
    fn from(p: &PoolSettings) -> Self {
        Self {
            pool_id: p.resolved_pool_id(),
            strategy_id: p.strategy_id.clone(),
            risk_profile: p.risk_profile.clone(),
            symbols: p.symbols.clone(),
        }
    }
}

/// Desk-wide policy shared by every pool.
#[derive(Debug, Clone, PartialEq)]
pub struct DeskParams {
    pub ledger: LedgerParams,
    pub maintenance_margin_buffer: Decimal,
    /// Percent added to the reference price when reserving margin ahead of a fill.
    pub margin_reservation_buffer_pct: Decimal,
}

impl Default for DeskParams {
    fn default() -> Self {
        Self {
            ledger: LedgerParams::default(),
            maintenance_margin_buffer: Decimal::new(9, 1),
            margin_reservation_buffer_pct: Decimal::ONE,
        }
    }
}

/// Read model for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSummary {
    pub spec: PoolSpec,
    pub pool: Pool,
    pub open_positions: Vec<Position>,
    pub risk: Option<RiskSnapshot>,
}

// ---------------------------------------------------------------------------
// PoolRuntime
// ---------------------------------------------------------------------------

pub struct PoolRuntime {
    spec: PoolSpec,
    cycle: tokio::sync::Mutex<()>,
    ledger: Mutex<PoolLedger>,
    book: RwLock<PositionBook>,
    risk: Mutex<DailyRiskBook>,
    marks: Mutex<PriceMap>,
}

/// Why a fill could not be reflected in the book/ledger. The pool is frozen.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BookingFailure(pub String);

impl PoolRuntime {
    fn new(spec: PoolSpec, ledger: PoolLedger, book: PositionBook, risk: DailyRiskBook) -> Self {
        Self {
            spec,
            cycle: tokio::sync::Mutex::new(()),
            ledger: Mutex::new(ledger),
            book: RwLock::new(book),
            risk: Mutex::new(risk),
            marks: Mutex::new(PriceMap::new()),
        }
    }

    pub fn spec(&self) -> &PoolSpec {
        &self.spec
    }

    pub fn pool_id(&self) -> PoolId {
        self.spec.pool_id
    }

    pub fn pool(&self) -> Pool {
        self.ledger().pool().clone()
    }

    pub fn orders(&self) -> Vec<InvestmentOrder> {
        self.ledger().orders().cloned().collect()
    }

    pub fn shares(&self) -> Vec<OrderShare> {
        self.ledger().shares().cloned().collect()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.book_read().open_positions().cloned().collect()
    }

    pub fn closed_positions(&self) -> Vec<Position> {
        self.book_read().closed_positions().to_vec()
    }

    pub fn latest_risk(&self) -> Option<RiskSnapshot> {
        self.risk_book().latest().cloned()
    }

    /// Last accepted marks.
    pub fn marks(&self) -> PriceMap {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn frozen_reason(&self) -> Option<String> {
        let ledger = self.ledger();
        ledger
            .is_frozen()
            .then(|| ledger.pool().frozen_reason.clone().unwrap_or_default())
    }

    pub(crate) fn freeze(&self, reason: impl Into<String>) {
        self.ledger().freeze(reason);
    }

    pub(crate) async fn lock_cycle(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    fn ledger(&self) -> MutexGuard<'_, PoolLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn book_read(&self) -> RwLockReadGuard<'_, PositionBook> {
        self.book.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn book_write(&self) -> RwLockWriteGuard<'_, PositionBook> {
        self.book.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn risk_book(&self) -> MutexGuard<'_, DailyRiskBook> {
        self.risk.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured symbols plus anything still held.
    pub(crate) fn watch_symbols(&self) -> Vec<String> {
        let mut set: BTreeSet<String> = self.spec.symbols.iter().cloned().collect();
        set.extend(self.book_read().symbols());
        set.into_iter().collect()
    }

    pub(crate) fn market_snapshot(&self, prices: &PriceMap, as_of: DateTime<Utc>) -> MarketSnapshot {
        let ledger = self.ledger();
        let book = self.book_read();
        MarketSnapshot {
            pool_id: self.spec.pool_id,
            as_of,
            prices: prices.clone(),
            available_capital: ledger.margin_capacity(),
            open_positions: book.views(),
        }
    }

    /// `(position id, side, quantity, current price, opening decision)` of
    /// every open position in `symbol`.
    pub(crate) fn open_in_symbol(
        &self,
        symbol: &str,
    ) -> Vec<(PositionId, PositionSide, Decimal, Decimal, Option<DecisionId>)> {
        self.book_read()
            .open_for_symbol(symbol)
            .into_iter()
            .map(|p| (p.id, p.side, p.quantity, p.current_price, p.decision_id))
            .collect()
    }

    pub(crate) fn position(&self, id: PositionId) -> Option<Position> {
        self.book_read().get(id).cloned()
    }

    fn mark(&self, prices: &PriceMap, now: DateTime<Utc>) -> Result<MarkReport, LedgerError> {
        let mut ledger = self.ledger();
        let mut book = self.book_write();
        let report = book.mark_to_market(prices);
        ledger.apply_unrealized(report.unrealized_pnl, now)?;
        drop(book);
        drop(ledger);
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(prices.iter().map(|(s, p)| (s.clone(), *p)));
        Ok(report)
    }

    fn risk_inputs(&self, journal: &Journal, day: NaiveDate) -> RiskInputs {
        let activity = journal.daily_activity(self.spec.pool_id, day);
        let ledger = self.ledger();
        let book = self.book_read();
        RiskInputs {
            pool_id: self.spec.pool_id,
            risk_profile: self.spec.risk_profile.clone(),
            total_capital: ledger.pool().total_capital,
            realized_today: activity.realized_pnl,
            unrealized_pnl: book.unrealized_pnl(),
            gross_exposure: book.gross_exposure(),
            open_positions: book.open_count() as u32,
            trades_executed: activity.executed_decisions,
        }
    }

    // -- cycle steps (called with the cycle lock held) -----------------------

    /// Sizing check for an entry at `price`.
    pub(crate) fn check_entry(
        &self,
        quantity: Decimal,
        price: Decimal,
        leverage: Decimal,
        limits: &PositionLimits,
    ) -> SizingVerdict {
        let ledger = self.ledger();
        let book = self.book_read();
        book.check_open(
            quantity,
            price,
            leverage,
            ledger.pool().total_capital,
            ledger.margin_capacity(),
            limits,
        )
    }

    pub(crate) fn margin_capacity(&self) -> Decimal {
        self.ledger().margin_capacity()
    }

    pub(crate) fn reserve_margin(&self, amount: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ledger().reserve_margin(amount, now)
    }

    pub(crate) fn release_margin(&self, amount: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ledger().release_margin(amount, now)
    }

    /// Turn a filled entry into a position: swap the pre-trade reservation
    /// for the position's actual margin. Any failure freezes the pool because
    /// the venue already holds the fill.
    pub(crate) fn book_entry(
        &self,
        decision: &Decision,
        side: PositionSide,
        trade: &Trade,
        reserved: Decimal,
        limits: &PositionLimits,
        now: DateTime<Utc>,
    ) -> Result<Position, BookingFailure> {
        let mut ledger = self.ledger();
        let mut book = self.book_write();

        let fail = |ledger: &mut PoolLedger, reason: String| {
            error!(pool_id = %self.spec.pool_id, trade_id = %trade.id, %reason, "fill could not be booked; freezing pool");
            ledger.freeze(format!("unbooked fill {}: {reason}", trade.id));
            BookingFailure(reason)
        };

        if let Err(e) = ledger.release_margin(reserved, now) {
            return Err(fail(&mut *ledger, e.to_string()));
        }

        let mut open = |stop: Option<Decimal>, take: Option<Decimal>, ledger: &PoolLedger| {
            book.open(
                Some(decision.id),
                &trade.symbol,
                side,
                trade.filled_qty,
                trade.avg_price,
                decision.leverage,
                stop,
                take,
                ledger.pool().total_capital,
                ledger.margin_capacity(),
                limits,
                now,
            )
        };

        let opened = match open(decision.stop_loss, decision.take_profit, &*ledger) {
            Err(PositionError::InvalidBracket(msg)) => {
                // The fill landed beyond a bracket level; hold the position
                // unbracketed and let the liquidation level protect it.
                warn!(pool_id = %self.spec.pool_id, decision_id = %decision.id, %msg, "bracket invalid at fill price; opening without bracket");
                open(None, None, &*ledger)
            }
            other => other,
        };
        let position = match opened {
            Ok(p) => p,
            Err(e) => return Err(fail(&mut *ledger, e.to_string())),
        };

        if let Err(e) = ledger.reserve_margin(position.initial_margin, now) {
            return Err(fail(&mut *ledger, e.to_string()));
        }
        if let Err(e) = ledger.apply_unrealized(book.unrealized_pnl(), now) {
            return Err(fail(&mut *ledger, e.to_string()));
        }

        info!(
            pool_id = %self.spec.pool_id,
            position_id = %position.id,
            symbol = %position.symbol,
            side = %position.side,
            quantity = %position.quantity,
            entry_price = %position.entry_price,
            margin = %position.initial_margin,
            "position opened"
        );
        Ok(position)
    }

    /// Close `quantity` of a position at `exit_price` and settle the realized
    /// P&L. Returns the close and, when the position is now fully closed, the
    /// position's total realized P&L across all of its closes.
    pub(crate) fn settle_exit(
        &self,
        position_id: PositionId,
        quantity: Decimal,
        exit_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<(PositionClose, Option<Decimal>), BookingFailure> {
        let mut ledger = self.ledger();
        let mut book = self.book_write();

        let fail = |ledger: &mut PoolLedger, reason: String| {
            error!(pool_id = %self.spec.pool_id, %position_id, %reason, "exit could not be settled; freezing pool");
            ledger.freeze(format!("unsettled exit of {position_id}: {reason}"));
            BookingFailure(reason)
        };

        let close = match book.close_quantity(position_id, quantity, exit_price, reason, now) {
            Ok(c) => c,
            Err(e) => return Err(fail(&mut *ledger, e.to_string())),
        };
        if let Err(e) = ledger.release_margin(close.margin_released, now) {
            return Err(fail(&mut *ledger, e.to_string()));
        }
        if let Err(e) = ledger.apply_unrealized(book.unrealized_pnl(), now) {
            return Err(fail(&mut *ledger, e.to_string()));
        }
        if let Err(e) = ledger.settle_trade(close.realized_pnl, now) {
            return Err(fail(&mut *ledger, e.to_string()));
        }

        let total = close.fully_closed.then(|| {
            book.closed_positions()
                .iter()
                .rev()
                .find(|p| p.id == position_id)
                .and_then(|p| p.realized_pnl)
                .unwrap_or(close.realized_pnl)
        });

        info!(
            pool_id = %self.spec.pool_id,
            %position_id,
            reason = %reason,
            quantity = %close.quantity,
            exit_price = %close.exit_price,
            realized_pnl = %close.realized_pnl,
            nav = %ledger.pool().current_nav_per_share,
            "position closed"
        );
        Ok((close, total))
    }
}

// ---------------------------------------------------------------------------
// TradingDesk
// ---------------------------------------------------------------------------

pub struct TradingDesk {
    params: DeskParams,
    risk: RiskManager,
    journal: Arc<Journal>,
    pools: RwLock<BTreeMap<PoolId, Arc<PoolRuntime>>>,
}

impl TradingDesk {
    pub fn new(params: DeskParams, risk: RiskManager, journal: Arc<Journal>) -> Self {
        Self {
            params,
            risk,
            journal,
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Desk with the configured parameters and profiles and no pools.
    pub fn configured(settings: &DeskSettings, journal: Arc<Journal>) -> Result<Self, DeskError> {
        let profiles = settings
            .risk_profiles()
            .map_err(|e| DeskError::InvalidPool(e.to_string()))?;
        Ok(Self::new(
            DeskParams {
                ledger: settings.ledger.clone(),
                maintenance_margin_buffer: settings.positions.maintenance_margin_buffer,
                margin_reservation_buffer_pct: settings.positions.margin_reservation_buffer_pct,
            },
            RiskManager::new(profiles),
            journal,
        ))
    }

    /// Desk with every configured pool registered fresh.
    pub fn from_settings(
        settings: &DeskSettings,
        journal: Arc<Journal>,
        now: DateTime<Utc>,
    ) -> Result<Self, DeskError> {
        let desk = Self::configured(settings, journal)?;
        for p in &settings.pools {
            desk.register_pool(PoolSpec::from(p), now)?;
        }
        Ok(desk)
    }

    pub fn params(&self) -> &DeskParams {
        &self.params
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    /// Register a fresh pool for a newly activated strategy.
    pub fn register_pool(&self, spec: PoolSpec, now: DateTime<Utc>) -> Result<Arc<PoolRuntime>, DeskError> {
        let ledger = PoolLedger::new(spec.pool_id, spec.strategy_id.clone(), self.params.ledger.clone(), now);
        let book = PositionBook::new(spec.pool_id, self.params.maintenance_margin_buffer);
        let risk = DailyRiskBook::new(spec.pool_id);
        self.insert(spec, ledger, book, risk)
    }

    /// Register a pool rebuilt from persisted state.
    pub fn restore_pool(
        &self,
        spec: PoolSpec,
        ledger: PoolLedger,
        positions: Vec<Position>,
        risk_history: Vec<RiskSnapshot>,
    ) -> Result<Arc<PoolRuntime>, DeskError> {
        if ledger.pool_id() != spec.pool_id {
            return Err(DeskError::InvalidPool(format!(
                "ledger belongs to {}, pool spec names {}",
                ledger.pool_id(),
                spec.pool_id
            )));
        }
        if let Some(reason) = ledger.pool().frozen_reason.as_deref() {
            warn!(pool_id = %spec.pool_id, %reason, "restored pool is frozen");
        }
        let book = PositionBook::restore(spec.pool_id, self.params.maintenance_margin_buffer, positions);
        let risk = DailyRiskBook::restore(spec.pool_id, risk_history);
        self.insert(spec, ledger, book, risk)
    }

    fn insert(
        &self,
        spec: PoolSpec,
        ledger: PoolLedger,
        book: PositionBook,
        risk: DailyRiskBook,
    ) -> Result<Arc<PoolRuntime>, DeskError> {
        if spec.symbols.is_empty() || spec.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(DeskError::InvalidPool(format!("pool {} has no symbols", spec.pool_id)));
        }
        self.risk.profile(&spec.risk_profile)?;

        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        if pools.contains_key(&spec.pool_id) {
            return Err(DeskError::DuplicatePool(spec.pool_id));
        }
        let id = spec.pool_id;
        info!(pool_id = %id, strategy_id = %spec.strategy_id, risk_profile = %spec.risk_profile, "pool registered");
        let runtime = Arc::new(PoolRuntime::new(spec, ledger, book, risk));
        pools.insert(id, Arc::clone(&runtime));
        Ok(runtime)
    }

    pub fn pool(&self, pool_id: PoolId) -> Result<Arc<PoolRuntime>, DeskError> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pool_id)
            .cloned()
            .ok_or(DeskError::UnknownPool(pool_id))
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn all_pools(&self) -> Vec<Arc<PoolRuntime>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn summary(&self, pool_id: PoolId) -> Result<PoolSummary, DeskError> {
        let p = self.pool(pool_id)?;
        Ok(PoolSummary {
            spec: p.spec().clone(),
            pool: p.pool(),
            open_positions: p.open_positions(),
            risk: p.latest_risk(),
        })
    }

    pub fn summaries(&self) -> Vec<PoolSummary> {
        self.all_pools()
            .into_iter()
            .map(|p| PoolSummary {
                spec: p.spec().clone(),
                pool: p.pool(),
                open_positions: p.open_positions(),
                risk: p.latest_risk(),
            })
            .collect()
    }

    /// Pool holding `order_id`.
    pub fn pool_for_order(&self, order_id: OrderId) -> Result<Arc<PoolRuntime>, DeskError> {
        self.all_pools()
            .into_iter()
            .find(|p| p.ledger().order(order_id).is_some())
            .ok_or(DeskError::UnknownOrder(order_id))
    }

    // -- investor operations -------------------------------------------------

    pub fn open_subscription(
        &self,
        pool_id: PoolId,
        user_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(InvestmentOrder, OrderShare), DeskError> {
        let pool = self.pool(pool_id)?;
        let out = pool.ledger().open_subscription(user_id, amount, now)?;
        info!(%pool_id, order_id = %out.0.id, %amount, shares = %out.1.shares_owned, "subscription opened");
        Ok(out)
    }

    pub fn top_up(&self, order_id: OrderId, amount: Decimal, now: DateTime<Utc>) -> Result<OrderShare, DeskError> {
        let pool = self.pool_for_order(order_id)?;
        let share = pool.ledger().top_up(order_id, amount, now)?;
        info!(pool_id = %pool.pool_id(), %order_id, %amount, "order topped up");
        Ok(share)
    }

    pub fn redeem(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Redemption, DeskError> {
        let pool = self.pool_for_order(order_id)?;
        let r = pool.ledger().redeem(order_id, now)?;
        info!(
            pool_id = %pool.pool_id(),
            %order_id,
            amount = %r.redemption_amount,
            penalty = %r.penalty,
            early = r.early,
            "order redeemed"
        );
        Ok(r)
    }

    pub fn liquidate(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Redemption, DeskError> {
        let pool = self.pool_for_order(order_id)?;
        let r = pool.ledger().liquidate(order_id, now)?;
        warn!(pool_id = %pool.pool_id(), %order_id, amount = %r.redemption_amount, "order liquidated");
        Ok(r)
    }

    pub fn pause_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<(), DeskError> {
        let pool = self.pool_for_order(order_id)?;
        pool.ledger().pause_order(order_id, now)?;
        Ok(())
    }

    pub fn resume_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<(), DeskError> {
        let pool = self.pool_for_order(order_id)?;
        pool.ledger().resume_order(order_id, now)?;
        Ok(())
    }

    /// Operator unfreeze; succeeds only if every ledger invariant holds.
    pub fn reconcile(&self, pool_id: PoolId, now: DateTime<Utc>) -> Result<(), DeskError> {
        let pool = self.pool(pool_id)?;
        pool.ledger().reconcile_and_unfreeze(now)?;
        info!(%pool_id, "pool reconciled and unfrozen");
        Ok(())
    }

    // -- marks and risk ------------------------------------------------------

    /// Mark open positions and publish unrealized P&L into NAV. Triggers are
    /// reported, not acted on; the next cycle executes them.
    pub fn mark_to_market(
        &self,
        pool_id: PoolId,
        prices: &PriceMap,
        now: DateTime<Utc>,
    ) -> Result<MarkReport, DeskError> {
        let pool = self.pool(pool_id)?;
        let report = pool.mark(prices, now)?;
        if !report.missing_symbols.is_empty() {
            warn!(%pool_id, missing = ?report.missing_symbols, "no mark for open symbols");
        }
        Ok(report)
    }

    /// Today's risk snapshot, recomputed and latched.
    pub fn evaluate_risk(&self, pool_id: PoolId, now: DateTime<Utc>) -> Result<RiskSnapshot, DeskError> {
        let inputs = self
            .risk_inputs(pool_id, now.date_naive())
            .ok_or(DeskError::UnknownPool(pool_id))?;
        let pool = self.pool(pool_id)?;
        let snapshot = {
            let mut book = pool.risk_book();
            self.risk.evaluate_inputs(&inputs, &mut book, now)?
        };
        if !snapshot.can_trade {
            info!(
                %pool_id,
                pause_reason = ?snapshot.pause_reason,
                daily_pnl_pct = %snapshot.daily_pnl_pct,
                exposure_pct = %snapshot.exposure_pct,
                "risk gate closed"
            );
        }
        Ok(snapshot)
    }

    /// Limits from the pool's risk profile.
    pub fn position_limits(&self, pool_id: PoolId) -> Result<PositionLimits, DeskError> {
        let pool = self.pool(pool_id)?;
        Ok(self.risk.profile(&pool.spec().risk_profile)?.position_limits())
    }
}

impl RiskInputSource for TradingDesk {
    fn risk_inputs(&self, pool_id: PoolId, day: NaiveDate) -> Option<RiskInputs> {
        let pool = self.pool(pool_id).ok()?;
        Some(pool.risk_inputs(&self.journal, day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqc_journal::MemorySink;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn desk() -> (TradingDesk, PoolId) {
        let desk = TradingDesk::new(
            DeskParams::default(),
            RiskManager::default(),
            Arc::new(Journal::new(MemorySink::default(), true)),
        );
        let pool_id = PoolId::new();
        desk.register_pool(
            PoolSpec {
                pool_id,
                strategy_id: StrategyId::new("trend"),
                risk_profile: "balanced".into(),
                symbols: vec!["BTCUSDT".into()],
            },
            now(),
        )
        .unwrap();
        (desk, pool_id)
    }

    #[test]
    fn registration_rejects_duplicates_and_unknown_profiles() {
        let (desk, pool_id) = desk();
        let spec = desk.pool(pool_id).unwrap().spec().clone();
        assert!(matches!(desk.register_pool(spec.clone(), now()), Err(DeskError::DuplicatePool(_))));

        let bad = PoolSpec {
            pool_id: PoolId::new(),
            risk_profile: "yolo".into(),
            ..spec
        };
        assert!(matches!(
            desk.register_pool(bad, now()),
            Err(DeskError::Risk(RiskError::UnknownProfile(_)))
        ));
    }

    #[test]
    fn subscription_and_redemption_route_by_order() {
        let (desk, pool_id) = desk();
        let (order, share) = desk
            .open_subscription(pool_id, UserId::new("investor-1"), dec!(1000), now())
            .unwrap();
        assert_eq!(share.shares_owned, dec!(1000));
        assert_eq!(desk.pool_for_order(order.id).unwrap().pool_id(), pool_id);

        let r = desk.redeem(order.id, now()).unwrap();
        assert!(r.early);
        assert_eq!(r.redemption_amount, dec!(980));
        assert!(matches!(
            desk.redeem(OrderId::new(), now()),
            Err(DeskError::UnknownOrder(_))
        ));
    }

    #[test]
    fn unknown_pool_is_reported() {
        let (desk, _) = desk();
        let missing = PoolId::new();
        assert!(matches!(desk.evaluate_risk(missing, now()), Err(DeskError::UnknownPool(_))));
        assert!(desk.risk_inputs(missing, now().date_naive()).is_none());
    }

    #[test]
    fn risk_inputs_reflect_ledger_and_book() {
        let (desk, pool_id) = desk();
        desk.open_subscription(pool_id, UserId::new("investor-1"), dec!(100000), now())
            .unwrap();
        let inputs = desk.risk_inputs(pool_id, now().date_naive()).unwrap();
        assert_eq!(inputs.total_capital, dec!(100000));
        assert_eq!(inputs.open_positions, 0);
        assert_eq!(inputs.risk_profile, "balanced");

        let snap = desk.evaluate_risk(pool_id, now()).unwrap();
        assert!(snap.can_trade);
        assert_eq!(desk.pool(pool_id).unwrap().latest_risk(), Some(snap));
    }

    #[test]
    fn watch_symbols_include_configured() {
        let (desk, pool_id) = desk();
        assert_eq!(desk.pool(pool_id).unwrap().watch_symbols(), vec!["BTCUSDT".to_string()]);
    }
}
