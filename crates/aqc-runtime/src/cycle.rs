//! One trading cycle for one pool.
//!
//! ```text
//! prices -> mark-to-market -> execute triggered exits
//!        -> proposal -> journal decision -> risk gate -> sizing
//!        -> reserve margin -> route/execute -> book fill -> settle
//! ```
//!
//! The pool's cycle lock is held for the whole pass. Ledger and book locks
//! are only taken inside the synchronous [`PoolRuntime`] steps, so the
//! simulated delay and live venue round trips never block admin reads.
//!
//! A cycle that stops early leaves its decision journaled with
//! `was_executed = false`. Nothing is retried within the cycle.

use std::sync::Arc;

use aqc_execution::{ExecutionError, ExecutionRequest, ExecutionRouter, FillSimulator, LiveVenue};
use aqc_journal::{JournalError, Realization};
use aqc_md::{validate_prices, FeedError, PriceFeed};
use aqc_portfolio::{LedgerError, MarkReport, PositionClose, PositionLimits, SizingVerdict};
use aqc_risk::{PauseReason, RiskSnapshot};
use aqc_schemas::{
    BatchId, CloseReason, Decision, DecisionId, PoolId, PositionId, PriceMap, ProposedDecision,
    Trade, TradeAction, TradeId,
};
use aqc_strategy::{reference_price, validate_proposal, DecisionSource, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::desk::{BookingFailure, DeskError, PoolRuntime, TradingDesk};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Desk(#[from] DeskError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// A fill happened but could not be reflected in the pool; the pool is frozen.
    #[error("trade {trade_id} could not be booked: {reason}")]
    Unbooked { trade_id: TradeId, reason: String },
}

/// Terminal state of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    PoolFrozen {
        reason: String,
    },
    /// The batch for this tick was already journaled.
    AlreadyProcessed,
    NoDecision,
    Hold {
        decision_id: DecisionId,
    },
    Rejected {
        decision_id: DecisionId,
        reason: String,
    },
    RiskBlocked {
        decision_id: DecisionId,
        pause_reason: Option<PauseReason>,
    },
    SizingRejected {
        decision_id: DecisionId,
        verdict: SizingVerdict,
    },
    ExecutionFailed {
        decision_id: DecisionId,
        trade_id: TradeId,
        error: String,
    },
    Opened {
        decision_id: DecisionId,
        position_id: PositionId,
        trade_id: TradeId,
        filled_qty: Decimal,
        avg_price: Decimal,
    },
    Closed {
        decision_id: DecisionId,
        closes: Vec<PositionClose>,
    },
    NothingToClose {
        decision_id: DecisionId,
        symbol: String,
    },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::PoolFrozen { .. } => "pool_frozen",
            CycleOutcome::AlreadyProcessed => "already_processed",
            CycleOutcome::NoDecision => "no_decision",
            CycleOutcome::Hold { .. } => "hold",
            CycleOutcome::Rejected { .. } => "rejected",
            CycleOutcome::RiskBlocked { .. } => "risk_blocked",
            CycleOutcome::SizingRejected { .. } => "sizing_rejected",
            CycleOutcome::ExecutionFailed { .. } => "execution_failed",
            CycleOutcome::Opened { .. } => "opened",
            CycleOutcome::Closed { .. } => "closed",
            CycleOutcome::NothingToClose { .. } => "nothing_to_close",
        }
    }

    pub fn decision_id(&self) -> Option<DecisionId> {
        match self {
            CycleOutcome::Hold { decision_id }
            | CycleOutcome::Rejected { decision_id, .. }
            | CycleOutcome::RiskBlocked { decision_id, .. }
            | CycleOutcome::SizingRejected { decision_id, .. }
            | CycleOutcome::ExecutionFailed { decision_id, .. }
            | CycleOutcome::Opened { decision_id, .. }
            | CycleOutcome::Closed { decision_id, .. }
            | CycleOutcome::NothingToClose { decision_id, .. } => Some(*decision_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub pool_id: PoolId,
    pub batch_id: BatchId,
    pub tick: DateTime<Utc>,
    pub mark: MarkReport,
    /// Stop/take/liquidation exits executed this cycle.
    pub trigger_closes: Vec<PositionClose>,
    pub risk: Option<RiskSnapshot>,
    pub outcome: CycleOutcome,
}

/// Type-erased cycle trigger for the scheduler and the daemon.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, pool_id: PoolId, tick: DateTime<Utc>) -> Result<CycleReport, CycleError>;
}

// ---------------------------------------------------------------------------
// TradingCycle
// ---------------------------------------------------------------------------

pub struct TradingCycle<L, S, F, D> {
    desk: Arc<TradingDesk>,
    router: Arc<ExecutionRouter<L, S>>,
    feed: F,
    source: D,
    max_price_jump_pct: Option<Decimal>,
}

impl<L, S, F, D> TradingCycle<L, S, F, D>
where
    L: LiveVenue,
    S: FillSimulator,
    F: PriceFeed,
    D: DecisionSource,
{
    pub fn new(desk: Arc<TradingDesk>, router: Arc<ExecutionRouter<L, S>>, feed: F, source: D) -> Self {
        Self {
            desk,
            router,
            feed,
            source,
            max_price_jump_pct: None,
        }
    }

    /// Reject marks that move more than `pct` percent from the previous accepted mark.
    pub fn with_max_price_jump_pct(mut self, pct: Decimal) -> Self {
        self.max_price_jump_pct = Some(pct);
        self
    }

    pub fn desk(&self) -> &Arc<TradingDesk> {
        &self.desk
    }

    pub fn router(&self) -> &Arc<ExecutionRouter<L, S>> {
        &self.router
    }

    /// Run one cycle for `pool_id` at `tick`. `tick` is the cycle's clock:
    /// it names the batch and timestamps every state change.
    pub async fn run(&self, pool_id: PoolId, tick: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let pool = self.desk.pool(pool_id)?;
        let _cycle = pool.lock_cycle().await;
        let batch_id = BatchId::for_tick(pool_id, tick);

        let mut report = CycleReport {
            pool_id,
            batch_id: batch_id.clone(),
            tick,
            mark: MarkReport::default(),
            trigger_closes: Vec::new(),
            risk: None,
            outcome: CycleOutcome::NoDecision,
        };

        if let Some(reason) = pool.frozen_reason() {
            warn!(%pool_id, %reason, "cycle skipped: pool frozen");
            report.outcome = CycleOutcome::PoolFrozen { reason };
            return Ok(report);
        }
        if self.desk.journal().has_batch(pool_id, &batch_id) {
            debug!(%pool_id, %batch_id, "cycle skipped: batch already processed");
            report.outcome = CycleOutcome::AlreadyProcessed;
            return Ok(report);
        }

        // -- prices and marks ------------------------------------------------
        let raw = self.feed.latest_prices(&pool.watch_symbols()).await?;
        let previous = pool.marks();
        let check = validate_prices(&raw, Some(&previous), self.max_price_jump_pct);
        for r in &check.rejected {
            warn!(%pool_id, symbol = %r.symbol, price = %r.price, issue = %r.issue, "price rejected");
        }
        let prices = check.accepted;
        report.mark = self.desk.mark_to_market(pool_id, &prices, tick)?;

        for trigger in report.mark.triggers.clone() {
            if let Some(close) = self
                .close_triggered(&pool, trigger.position_id, trigger.reason, trigger.price, tick)
                .await?
            {
                report.trigger_closes.push(close);
            }
        }

        // -- decision --------------------------------------------------------
        let snapshot = pool.market_snapshot(&prices, tick);
        let Some(proposal) = self.source.propose_decision(&snapshot).await? else {
            info!(%pool_id, %batch_id, "no decision this cycle");
            return Ok(report);
        };

        let decision = Decision::from_proposal(pool_id, batch_id.clone(), &proposal, tick);
        self.desk.journal().record_decision(&decision)?;
        info!(
            %pool_id,
            decision_id = %decision.id,
            action = %decision.action,
            symbol = %decision.symbol,
            quantity = %decision.suggested_amount,
            confidence = decision.confidence_score,
            "decision recorded"
        );

        let risk = self.desk.evaluate_risk(pool_id, tick)?;
        report.risk = Some(risk.clone());

        if let Err(rejection) = validate_proposal(&proposal, &snapshot, &pool.spec().symbols) {
            warn!(%pool_id, decision_id = %decision.id, %rejection, "proposal rejected");
            report.outcome = CycleOutcome::Rejected {
                decision_id: decision.id,
                reason: rejection.to_string(),
            };
            return Ok(report);
        }
        if decision.action == TradeAction::Hold {
            report.outcome = CycleOutcome::Hold {
                decision_id: decision.id,
            };
            return Ok(report);
        }
        if !risk.can_trade {
            report.outcome = CycleOutcome::RiskBlocked {
                decision_id: decision.id,
                pause_reason: risk.pause_reason,
            };
            return Ok(report);
        }

        report.outcome = match decision.action.entry_side() {
            Some(_) => {
                let Some(reference) = reference_price(&proposal, &snapshot) else {
                    // validate_proposal already requires a price for entries
                    return Ok(report);
                };
                self.enter(&pool, &decision, reference, tick).await?
            }
            None => self.close_symbol(&pool, &decision, &prices, tick).await?,
        };
        Ok(report)
    }

    async fn enter(
        &self,
        pool: &PoolRuntime,
        decision: &Decision,
        reference: Decimal,
        tick: DateTime<Utc>,
    ) -> Result<CycleOutcome, CycleError> {
        let pool_id = pool.pool_id();
        let (Some(side), Some(req)) = (
            decision.action.entry_side(),
            ExecutionRequest::entry(decision, reference),
        ) else {
            return Ok(CycleOutcome::Hold {
                decision_id: decision.id,
            });
        };

        // Limits apply to the margin at the reference price; the slippage
        // buffer only widens what is held back from capacity.
        let limits = self.desk.position_limits(pool_id)?;
        let buffer = Decimal::ONE + self.desk.params().margin_reservation_buffer_pct / Decimal::ONE_HUNDRED;
        let verdict = match pool.check_entry(decision.suggested_amount, reference, decision.leverage, &limits) {
            SizingVerdict::Fits { margin } => {
                let reserved = margin * buffer;
                let capacity = pool.margin_capacity();
                if reserved > capacity {
                    SizingVerdict::InsufficientCapital {
                        margin: reserved,
                        capacity,
                    }
                } else {
                    SizingVerdict::Fits { margin: reserved }
                }
            }
            other => other,
        };
        let reserved = match verdict {
            SizingVerdict::Fits { margin } => margin,
            other => {
                info!(%pool_id, decision_id = %decision.id, verdict = ?other, "entry rejected by sizing");
                return Ok(CycleOutcome::SizingRejected {
                    decision_id: decision.id,
                    verdict: other,
                });
            }
        };
        pool.reserve_margin(reserved, tick)?;

        let book = self.router.route(pool_id, &pool.spec().strategy_id);
        let trade = match self.router.execute(&req, book).await {
            Ok(t) => t,
            Err(e) => {
                pool.release_margin(reserved, tick)?;
                return Err(e.into());
            }
        };
        if !trade.is_executed() || trade.filled_qty <= Decimal::ZERO {
            pool.release_margin(reserved, tick)?;
            return Ok(execution_failed(decision.id, &trade));
        }

        // The venue holds the fill, so the position limit is relaxed to the
        // whole pool when booking; capacity is still enforced.
        let booking_limits = PositionLimits {
            max_position_pct: Decimal::ONE_HUNDRED,
            ..limits
        };
        let position = pool
            .book_entry(decision, side, &trade, reserved, &booking_limits, tick)
            .map_err(|BookingFailure(reason)| CycleError::Unbooked {
                trade_id: trade.id,
                reason,
            })?;
        self.desk
            .journal()
            .record_execution(decision.id, trade.avg_price, tick)?;

        Ok(CycleOutcome::Opened {
            decision_id: decision.id,
            position_id: position.id,
            trade_id: trade.id,
            filled_qty: trade.filled_qty,
            avg_price: trade.avg_price,
        })
    }

    /// Flatten every open position in the decision's symbol.
    async fn close_symbol(
        &self,
        pool: &PoolRuntime,
        decision: &Decision,
        prices: &PriceMap,
        tick: DateTime<Utc>,
    ) -> Result<CycleOutcome, CycleError> {
        let pool_id = pool.pool_id();
        let open = pool.open_in_symbol(&decision.symbol);
        if open.is_empty() {
            info!(%pool_id, decision_id = %decision.id, symbol = %decision.symbol, "close requested with no open position");
            return Ok(CycleOutcome::NothingToClose {
                decision_id: decision.id,
                symbol: decision.symbol.clone(),
            });
        }

        let book = self.router.route(pool_id, &pool.spec().strategy_id);
        let mut closes = Vec::new();
        let mut last_failure: Option<Trade> = None;
        for (position_id, side, quantity, current, _) in open {
            let reference = prices
                .get(&decision.symbol)
                .copied()
                .filter(|p| *p > Decimal::ZERO)
                .or(decision.suggested_price)
                .unwrap_or(current);
            let req = ExecutionRequest::exit(decision, side, quantity, reference);
            let trade = self.router.execute(&req, book).await?;
            if !trade.is_executed() || trade.filled_qty <= Decimal::ZERO {
                warn!(%pool_id, %position_id, error = ?trade.error, "exit order failed");
                last_failure = Some(trade);
                continue;
            }
            let close = self.settle(pool, position_id, &trade, CloseReason::Manual, None, tick)?;
            closes.push(close);
        }

        if closes.is_empty() {
            return Ok(match last_failure {
                Some(trade) => execution_failed(decision.id, &trade),
                None => CycleOutcome::NothingToClose {
                    decision_id: decision.id,
                    symbol: decision.symbol.clone(),
                },
            });
        }

        let qty: Decimal = closes.iter().map(|c| c.quantity).sum();
        let notional: Decimal = closes.iter().map(|c| c.quantity * c.exit_price).sum();
        let avg_exit = if qty > Decimal::ZERO {
            (notional / qty).round_dp(8)
        } else {
            Decimal::ZERO
        };
        self.desk
            .journal()
            .record_execution(decision.id, avg_exit, tick)?;

        Ok(CycleOutcome::Closed {
            decision_id: decision.id,
            closes,
        })
    }

    /// Execute an exit produced by mark-to-market. The order goes out under
    /// the position's opening decision, or under a journaled risk-exit
    /// decision when the position has none. A position that cannot be
    /// attached to any decision is never closed on paper: the pool freezes.
    async fn close_triggered(
        &self,
        pool: &PoolRuntime,
        position_id: PositionId,
        reason: CloseReason,
        price: Decimal,
        tick: DateTime<Utc>,
    ) -> Result<Option<PositionClose>, CycleError> {
        let pool_id = pool.pool_id();
        let Some(position) = pool.position(position_id) else {
            return Ok(None);
        };
        info!(%pool_id, %position_id, symbol = %position.symbol, reason = %reason, %price, "exit triggered");

        let opening = position
            .decision_id
            .filter(|d| self.desk.journal().decision(*d).is_some());
        let (decision_id, risk_exit) = match opening {
            Some(d) => (d, None),
            None => {
                let proposal = ProposedDecision {
                    action: TradeAction::Close,
                    symbol: position.symbol.clone(),
                    quantity: position.quantity,
                    suggested_price: Some(price),
                    stop_loss: None,
                    take_profit: None,
                    leverage: position.leverage,
                    reasoning: format!("{reason} exit of position {position_id}"),
                    confidence_score: 1.0,
                    risk_score: 1.0,
                };
                let batch = BatchId::new(format!("{}:{reason}:{position_id}", BatchId::for_tick(pool_id, tick)));
                let decision = Decision::from_proposal(pool_id, batch, &proposal, tick);
                if let Err(e) = self.desk.journal().record_decision(&decision) {
                    error!(%pool_id, %position_id, error = %e, "risk exit could not be journaled; freezing pool");
                    pool.freeze(format!("unrouted {reason} exit of {position_id}: {e}"));
                    return Err(e.into());
                }
                warn!(%pool_id, %position_id, decision_id = %decision.id, "position has no journaled decision; routing under a risk-exit decision");
                (decision.id, Some(decision.id))
            }
        };

        let req = ExecutionRequest {
            decision_id,
            pool_id,
            symbol: position.symbol.clone(),
            side: position.side.exit_side(),
            quantity: position.quantity,
            reference_price: price,
        };
        let book = self.router.route(pool_id, &pool.spec().strategy_id);
        let trade = self.router.execute(&req, book).await?;
        if !trade.is_executed() || trade.filled_qty <= Decimal::ZERO {
            warn!(%pool_id, %position_id, error = ?trade.error, "triggered exit failed; retrying next cycle");
            return Ok(None);
        }
        if let Some(d) = risk_exit {
            self.desk
                .journal()
                .record_execution(d, trade.avg_price, tick)?;
        }
        self.settle(pool, position_id, &trade, reason, risk_exit, tick).map(Some)
    }

    /// Book an exit fill, journal the P&L it realized, and back-fill the
    /// outcome once the position is flat. The outcome lands on `risk_exit`
    /// when given, otherwise on the position's journaled opening decision.
    fn settle(
        &self,
        pool: &PoolRuntime,
        position_id: PositionId,
        trade: &Trade,
        reason: CloseReason,
        risk_exit: Option<DecisionId>,
        tick: DateTime<Utc>,
    ) -> Result<PositionClose, CycleError> {
        let (close, total) = pool
            .settle_exit(position_id, trade.filled_qty, trade.avg_price, reason, tick)
            .map_err(|BookingFailure(reason)| CycleError::Unbooked {
                trade_id: trade.id,
                reason,
            })?;
        let journal = self.desk.journal();
        let opening = close.decision_id.filter(|d| journal.decision(*d).is_some());
        journal.record_realization(&Realization {
            pool_id: pool.pool_id(),
            position_id,
            decision_id: opening,
            quantity: close.quantity,
            pnl: close.realized_pnl,
            realized_at: tick,
        })?;
        if let (Some(owner), Some(pnl)) = (risk_exit.or(opening), total) {
            journal.record_outcome(owner, pnl, pnl > Decimal::ZERO, tick)?;
        }
        Ok(close)
    }
}

fn execution_failed(decision_id: DecisionId, trade: &Trade) -> CycleOutcome {
    CycleOutcome::ExecutionFailed {
        decision_id,
        trade_id: trade.id,
        error: trade
            .error
            .clone()
            .unwrap_or_else(|| format!("trade {}", trade.status)),
    }
}

#[async_trait]
impl<L, S, F, D> CycleRunner for TradingCycle<L, S, F, D>
where
    L: LiveVenue,
    S: FillSimulator,
    F: PriceFeed,
    D: DecisionSource,
{
    async fn run_cycle(&self, pool_id: PoolId, tick: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let report = self.run(pool_id, tick).await?;
        info!(
            %pool_id,
            batch_id = %report.batch_id,
            outcome = report.outcome.label(),
            marked = report.mark.marked,
            trigger_closes = report.trigger_closes.len(),
            "cycle complete"
        );
        Ok(report)
    }
}
