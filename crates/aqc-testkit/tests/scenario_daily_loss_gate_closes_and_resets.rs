//! Scenario: a balanced 100,000 pool loses its way through the 5% daily
//! loss limit, is blocked for the rest of the UTC day and trades again the
//! next day.
//!
//! Three 1 BTC longs at 40,000 exit at 38,500, 38,300 and 38,000
//! (-1,500, -1,700, -2,000; -5,200 in total). The third exit is a stop-loss
//! so it runs even though the gate is about to close.
//!
//! # Invariants under test
//!
//! 1. After two losses (-3.2%) the gate is still open.
//! 2. Once realized losses reach -5.2% the next decision is journaled but
//!    blocked with `MaxDailyLoss`, and is never executed.
//! 3. The gate stays closed for later cycles the same day.
//! 4. The first cycle of the next UTC day starts from a clean daily P&L.

use anyhow::Result;
use aqc_risk::PauseReason;
use aqc_runtime::CycleOutcome;
use aqc_schemas::{CloseReason, PoolId};
use aqc_testkit::{close, long, tick, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BTC: &str = "BTCUSDT";

async fn round_trip(h: &Harness, pool_id: PoolId, at: i64, exit: Decimal) -> Result<()> {
    h.set_price(BTC, dec!(40000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(at)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Opened { .. }), "{:?}", r.outcome);

    h.set_price(BTC, exit);
    h.source.push(close(BTC));
    let r = h.run(pool_id, tick(at + 1)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Closed { .. }), "{:?}", r.outcome);
    Ok(())
}

#[tokio::test]
async fn daily_loss_limit_blocks_until_next_utc_day() -> Result<()> {
    let h = Harness::new()?;
    let pool_id = h.add_pool("trend", "balanced", &[BTC])?;
    h.subscribe(pool_id, dec!(100000), tick(0))?;

    round_trip(&h, pool_id, 0, dec!(38500)).await?;
    round_trip(&h, pool_id, 2, dec!(38300)).await?;
    assert_eq!(h.desk.pool(pool_id)?.pool().realized_pnl, dec!(-3200));

    // -- third entry: gate still open at -3.2% ----------------------------
    h.set_price(BTC, dec!(40000));
    let mut entry = long(BTC, dec!(1), dec!(5));
    entry.stop_loss = Some(dec!(38000));
    h.source.push(entry);
    let r = h.run(pool_id, tick(4)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Opened { .. }), "{:?}", r.outcome);
    let risk = r.risk.expect("risk evaluated");
    assert!(risk.can_trade);
    assert_eq!(risk.daily_pnl, dec!(-3200));
    assert_eq!(risk.daily_pnl_pct, dec!(-3.2));
    assert_eq!(risk.max_loss_remaining, dec!(1800));

    // -- stop-loss realizes the third loss; the new decision is blocked ----
    h.set_price(BTC, dec!(38000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(5)).await?;
    assert_eq!(r.trigger_closes.len(), 1);
    assert_eq!(r.trigger_closes[0].reason, CloseReason::StopLoss);
    assert_eq!(r.trigger_closes[0].realized_pnl, dec!(-2000));

    let CycleOutcome::RiskBlocked { decision_id, pause_reason } = r.outcome else {
        panic!("expected risk block, got {:?}", r.outcome);
    };
    assert_eq!(pause_reason, Some(PauseReason::MaxDailyLoss));
    let risk = r.risk.expect("risk evaluated");
    assert!(!risk.can_trade);
    assert_eq!(risk.daily_pnl, dec!(-5200));
    assert_eq!(risk.daily_pnl_pct, dec!(-5.2));
    assert_eq!(risk.max_loss_remaining, Decimal::ZERO);

    let blocked = h.decision(decision_id)?;
    assert!(!blocked.was_executed);
    assert!(blocked.execution_price.is_none());

    let pool = h.desk.pool(pool_id)?;
    assert!(pool.open_positions().is_empty());
    let p = pool.pool();
    assert_eq!(p.realized_pnl, dec!(-5200));
    assert_eq!(p.locked_capital, Decimal::ZERO);
    assert_eq!(p.current_nav_per_share, dec!(0.948));
    assert_eq!(p.total_trades, 3);
    assert_eq!(p.winning_trades, 0);

    // -- later the same day: still closed --------------------------------
    h.set_price(BTC, dec!(40000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(6)).await?;
    assert!(matches!(r.outcome, CycleOutcome::RiskBlocked { .. }), "{:?}", r.outcome);
    assert!(h.desk.evaluate_risk(pool_id, tick(7))?.pause_reason.is_some());

    // -- next UTC day ----------------------------------------------------
    let tomorrow = 24 * 60;
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(tomorrow)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Opened { .. }), "{:?}", r.outcome);
    let risk = r.risk.expect("risk evaluated");
    assert!(risk.can_trade);
    assert_eq!(risk.daily_pnl, Decimal::ZERO);
    assert_eq!(risk.trades_executed, 0);
    Ok(())
}

#[tokio::test]
async fn blocked_pool_leaves_neighbours_trading() -> Result<()> {
    let h = Harness::new()?;
    let losing = h.add_pool("trend", "balanced", &[BTC])?;
    let other = h.add_pool("trend", "balanced", &[BTC])?;
    h.subscribe(losing, dec!(100000), tick(0))?;
    h.subscribe(other, dec!(100000), tick(0))?;

    // A 6,000 stop-out on a 5x long of 1 BTC; 34,000 is above the 32,800
    // liquidation level.
    h.set_price(BTC, dec!(40000));
    let mut entry = long(BTC, dec!(1), dec!(5));
    entry.stop_loss = Some(dec!(34500));
    h.source.push(entry);
    h.run(losing, tick(0)).await?;

    h.set_price(BTC, dec!(34000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(losing, tick(1)).await?;
    assert_eq!(r.trigger_closes[0].realized_pnl, dec!(-6000));
    assert!(matches!(r.outcome, CycleOutcome::RiskBlocked { .. }), "{:?}", r.outcome);

    h.set_price(BTC, dec!(40000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(other, tick(2)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Opened { .. }), "{:?}", r.outcome);
    assert_eq!(h.desk.pool(other)?.pool().realized_pnl, Decimal::ZERO);
    Ok(())
}
