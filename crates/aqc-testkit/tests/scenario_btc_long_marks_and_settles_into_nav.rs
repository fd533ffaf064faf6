//! Scenario: one BTC long from open to settlement on the B-Book.
//!
//! # Invariants under test
//!
//! 1. A 1 BTC long at 40,000 with 5x leverage locks 8,000 of margin.
//! 2. Marking at 44,000 shows 4,000 unrealized (50% of margin) in the
//!    position and in the pool NAV before anything is closed.
//! 3. Closing realizes the 4,000 into NAV, unlocks the margin and back-fills
//!    the opening decision's outcome.
//! 4. The journal written along the way verifies and replays to the same
//!    statistics.

use anyhow::Result;
use aqc_journal::{verify_hash_chain_str, Journal, MemorySink, StatsFilter, VerifyResult};
use aqc_runtime::CycleOutcome;
use aqc_schemas::{BookType, CloseReason, ProposedDecision};
use aqc_testkit::{close, long, tick, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn btc_long_marks_then_realizes_into_nav() -> Result<()> {
    let h = Harness::new()?;
    let pool_id = h.add_pool("trend", "balanced", &["BTCUSDT"])?;
    h.subscribe(pool_id, dec!(100000), tick(0))?;
    let pool = h.desk.pool(pool_id)?;

    // -- open ------------------------------------------------------------
    h.set_price("BTCUSDT", dec!(40000));
    h.source.push(long("BTCUSDT", dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(0)).await?;
    let CycleOutcome::Opened { decision_id, avg_price, filled_qty, .. } = r.outcome else {
        panic!("expected open, got {:?}", r.outcome);
    };
    assert_eq!(avg_price, dec!(40000));
    assert_eq!(filled_qty, dec!(1));

    let p = pool.pool();
    assert_eq!(p.locked_capital, dec!(8000));
    assert_eq!(p.available_capital, dec!(92000));
    assert_eq!(p.current_nav_per_share, dec!(1));

    // -- mark --------------------------------------------------------------
    h.set_price("BTCUSDT", dec!(44000));
    h.source.push(ProposedDecision::hold("let it run"));
    let r = h.run(pool_id, tick(1)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Hold { .. }));
    assert_eq!(r.mark.unrealized_pnl, dec!(4000));
    assert!(r.trigger_closes.is_empty());

    let open = pool.open_positions();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].unrealized_pnl, dec!(4000));
    assert_eq!(open[0].unrealized_pnl_pct, dec!(50));
    assert_eq!(open[0].notional_value, dec!(44000));

    let p = pool.pool();
    assert_eq!(p.unrealized_pnl, dec!(4000));
    assert_eq!(p.realized_pnl, Decimal::ZERO);
    assert_eq!(p.current_nav_per_share, dec!(1.04));

    let risk = r.risk.expect("risk evaluated for a journaled decision");
    assert!(risk.can_trade);
    assert_eq!(risk.daily_pnl, dec!(4000));
    assert_eq!(risk.daily_pnl_pct, dec!(4));
    assert!(risk.target_reached);

    // -- close -------------------------------------------------------------
    h.source.push(close("BTCUSDT"));
    let r = h.run(pool_id, tick(2)).await?;
    let CycleOutcome::Closed { closes, .. } = r.outcome else {
        panic!("expected close, got {:?}", r.outcome);
    };
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].realized_pnl, dec!(4000));
    assert_eq!(closes[0].reason, CloseReason::Manual);
    assert!(closes[0].fully_closed);

    let p = pool.pool();
    assert_eq!(p.realized_pnl, dec!(4000));
    assert_eq!(p.unrealized_pnl, Decimal::ZERO);
    assert_eq!(p.locked_capital, Decimal::ZERO);
    assert_eq!(p.available_capital, dec!(100000));
    assert_eq!(p.current_nav_per_share, dec!(1.04));
    assert_eq!(p.total_trades, 1);
    assert_eq!(p.winning_trades, 1);
    assert!(pool.open_positions().is_empty());
    assert_eq!(pool.closed_positions().len(), 1);

    let opening = h.decision(decision_id)?;
    assert!(opening.was_executed);
    assert_eq!(opening.execution_price, Some(dec!(40000)));
    assert_eq!(opening.outcome_pnl, Some(dec!(4000)));
    assert_eq!(opening.was_successful, Some(true));
    Ok(())
}

#[tokio::test]
async fn walkthrough_journal_verifies_and_replays() -> Result<()> {
    let h = Harness::new()?;
    let pool_id = h.add_pool("trend", "balanced", &["BTCUSDT"])?;
    h.subscribe(pool_id, dec!(100000), tick(0))?;

    h.set_price("BTCUSDT", dec!(40000));
    h.source.push(long("BTCUSDT", dec!(1), dec!(5)));
    h.run(pool_id, tick(0)).await?;
    h.set_price("BTCUSDT", dec!(44000));
    h.source.push(close("BTCUSDT"));
    h.run(pool_id, tick(1)).await?;

    let contents = h.journal_contents();
    // decision, trade, execution; decision, trade, outcome, execution
    assert!(matches!(
        verify_hash_chain_str(&contents)?,
        VerifyResult::Valid { lines: 7 }
    ));

    let live = h.journal().statistics(&StatsFilter::default());
    assert_eq!(live.total_decisions, 2);
    assert_eq!(live.total_trades, 2);
    assert_eq!(live.executed, 2);
    assert_eq!(live.successful, 1);
    assert_eq!(live.total_pnl, dec!(4000));
    assert_eq!(live.per_book_trade_count(BookType::B), 2);
    assert_eq!(live.per_book_volume(BookType::B), dec!(84000));

    let replayed = Journal::replay_str(&contents, MemorySink::default(), true)?;
    assert_eq!(replayed.statistics(&StatsFilter::default()), live);
    assert_eq!(replayed.last_hash(), h.journal().last_hash());
    Ok(())
}
