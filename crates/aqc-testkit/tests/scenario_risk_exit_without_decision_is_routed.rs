//! Scenario: a restored position whose opening decision is not in the
//! journal hits its stop on an A-Book pool.
//!
//! # Invariants under test
//!
//! 1. The exit is sent to the live venue under a journaled close decision;
//!    the pool never books a close the venue did not fill.
//! 2. A venue rejection leaves the position open and the ledger untouched,
//!    and the next cycle tries again.
//! 3. The realized loss reaches the daily risk figures and the outcome lands
//!    on the risk-exit decision.

use anyhow::Result;
use aqc_execution::VenueError;
use aqc_journal::TradeFilter;
use aqc_portfolio::{LedgerParams, PoolLedger, PositionBook, PositionLimits};
use aqc_runtime::{CycleOutcome, PoolSpec};
use aqc_schemas::{
    BookType, CloseReason, OrderSide, PoolId, PositionSide, StrategyId, TradeAction, UserId,
};
use aqc_testkit::{tick, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BTC: &str = "BTCUSDT";

/// Pool funded with 100000 holding 1 BTC long at 40000, 5x, stop 38000,
/// with no opening decision.
fn restore_orphan(h: &Harness) -> Result<PoolId> {
    let pool_id = PoolId::new();
    let strategy = StrategyId::new("legacy-trend");
    let mut ledger = PoolLedger::new(pool_id, strategy.clone(), LedgerParams::default(), tick(0));
    ledger.open_subscription(UserId::new("investor-1"), dec!(100000), tick(0))?;

    let mut book = PositionBook::new(pool_id, h.desk.params().maintenance_margin_buffer);
    let limits = PositionLimits {
        max_position_pct: dec!(20),
        max_leverage: dec!(5),
    };
    let position = book.open(
        None,
        BTC,
        PositionSide::Long,
        dec!(1),
        dec!(40000),
        dec!(5),
        Some(dec!(38000)),
        None,
        ledger.pool().total_capital,
        ledger.margin_capacity(),
        &limits,
        tick(0),
    )?;
    ledger.reserve_margin(position.initial_margin, tick(0))?;

    h.desk.restore_pool(
        PoolSpec {
            pool_id,
            strategy_id: strategy,
            risk_profile: "balanced".into(),
            symbols: vec![BTC.into()],
        },
        ledger,
        vec![position],
        Vec::new(),
    )?;
    Ok(pool_id)
}

#[tokio::test]
async fn stop_on_orphan_position_goes_through_the_venue() -> Result<()> {
    let h = Harness::with_default_book(BookType::A)?;
    let pool_id = restore_orphan(&h)?;

    h.set_price(BTC, dec!(37500));
    let r = h.run(pool_id, tick(1)).await?;
    assert_eq!(r.outcome, CycleOutcome::NoDecision);
    assert_eq!(r.trigger_closes.len(), 1);
    assert_eq!(r.trigger_closes[0].reason, CloseReason::StopLoss);
    assert_eq!(r.trigger_closes[0].realized_pnl, dec!(-2500));

    let placed = h.venue.placed();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, OrderSide::Sell);
    assert_eq!(placed[0].quantity, dec!(1));

    let decisions = h.journal().decisions_for_pool(pool_id);
    assert_eq!(decisions.len(), 1);
    let exit = &decisions[0];
    assert_eq!(exit.action, TradeAction::Close);
    assert!(exit.was_executed);
    assert_eq!(exit.execution_price, Some(dec!(37500)));
    assert_eq!(exit.outcome_pnl, Some(dec!(-2500)));
    assert_eq!(exit.was_successful, Some(false));

    let trades = h.journal().trade_history(&TradeFilter {
        pool_id: Some(pool_id),
        ..TradeFilter::default()
    });
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].decision_id, exit.id);
    assert_eq!(trades[0].book_type, BookType::A);
    assert!(!trades[0].is_simulated);

    let pool = h.desk.pool(pool_id)?;
    assert!(pool.open_positions().is_empty());
    assert_eq!(pool.pool().realized_pnl, dec!(-2500));
    assert_eq!(pool.pool().locked_capital, Decimal::ZERO);

    let risk = h.desk.evaluate_risk(pool_id, tick(1))?;
    assert_eq!(risk.daily_pnl, dec!(-2500));
    Ok(())
}

#[tokio::test]
async fn rejected_risk_exit_keeps_the_position_open() -> Result<()> {
    let h = Harness::with_default_book(BookType::A)?;
    let pool_id = restore_orphan(&h)?;
    h.venue
        .push_placement(Err(VenueError::Rejected("exchange maintenance".into())));

    h.set_price(BTC, dec!(37500));
    let r = h.run(pool_id, tick(1)).await?;
    assert!(r.trigger_closes.is_empty());

    let pool = h.desk.pool(pool_id)?;
    assert_eq!(pool.open_positions().len(), 1);
    assert_eq!(pool.pool().realized_pnl, Decimal::ZERO);
    assert_eq!(pool.pool().locked_capital, dec!(8000));
    assert!(pool.frozen_reason().is_none());

    // still below the stop: the next cycle routes again and fills
    let r = h.run(pool_id, tick(2)).await?;
    assert_eq!(r.trigger_closes.len(), 1);
    assert_eq!(h.venue.placed().len(), 2);
    assert!(pool.open_positions().is_empty());
    assert_eq!(pool.pool().realized_pnl, dec!(-2500));
    Ok(())
}
