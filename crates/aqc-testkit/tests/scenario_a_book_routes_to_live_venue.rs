//! Scenario: A-Book routing through the live venue seam.
//!
//! # Invariants under test
//!
//! 1. A pool override to the A-Book sends the order to the live venue, and
//!    a working order is polled until the venue reports it filled.
//! 2. The position is booked at the venue's fill price, not the mark.
//! 3. A venue rejection becomes a failed, journaled trade; the reserved
//!    margin is released and the decision stays unexecuted.
//! 4. Routing changes apply to the next cycle; B-Book pools never reach the
//!    venue.

use anyhow::Result;
use aqc_execution::{OrderType, VenueError, VenueOrderAck, VenueOrderStatus};
use aqc_journal::TradeFilter;
use aqc_runtime::CycleOutcome;
use aqc_schemas::{BookType, OrderSide, PoolId, StrategyId, TradeStatus};
use aqc_testkit::{long, tick, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BTC: &str = "BTCUSDT";

fn route_pool(h: &Harness, pool_id: PoolId, book: BookType) -> Result<()> {
    let mut cfg = h.books().get();
    cfg.pool_overrides.insert(pool_id, book);
    h.books().replace(cfg)?;
    Ok(())
}

fn ack(status: VenueOrderStatus, filled: Decimal, price: Option<Decimal>) -> VenueOrderAck {
    VenueOrderAck {
        external_id: "ext-1".into(),
        status,
        filled_qty: filled,
        avg_price: price,
    }
}

#[tokio::test]
async fn working_order_is_confirmed_and_booked_at_venue_price() -> Result<()> {
    let h = Harness::new()?;
    let pool_id = h.add_pool("trend", "balanced", &[BTC])?;
    h.subscribe(pool_id, dec!(100000), tick(0))?;
    route_pool(&h, pool_id, BookType::A)?;

    h.venue.push_placement(Ok(ack(VenueOrderStatus::New, Decimal::ZERO, None)));
    h.venue.push_status(Ok(ack(VenueOrderStatus::PartiallyFilled, dec!(0.5), Some(dec!(40010)))));
    h.venue.push_status(Ok(ack(VenueOrderStatus::Filled, dec!(1), Some(dec!(40020)))));

    h.set_price(BTC, dec!(40000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(0)).await?;
    let CycleOutcome::Opened { decision_id, avg_price, filled_qty, .. } = r.outcome else {
        panic!("expected open, got {:?}", r.outcome);
    };
    assert_eq!(avg_price, dec!(40020));
    assert_eq!(filled_qty, dec!(1));

    let placed = h.venue.placed();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, OrderSide::Buy);
    assert_eq!(placed[0].order_type, OrderType::Market);
    assert_eq!(placed[0].quantity, dec!(1));
    assert_eq!(placed[0].price, dec!(40000));
    assert!(placed[0].client_order_id.starts_with("aqc-"));
    assert_eq!(h.venue.status_queries(), vec!["ext-1".to_string(), "ext-1".to_string()]);

    let trades = h.journal().trade_history(&TradeFilter {
        pool_id: Some(pool_id),
        ..TradeFilter::default()
    });
    assert_eq!(trades.len(), 1);
    let t = &trades[0];
    assert_eq!(t.book_type, BookType::A);
    assert!(!t.is_simulated);
    assert_eq!(t.status, TradeStatus::Filled);
    assert_eq!(t.external_id.as_deref(), Some("ext-1"));
    assert_eq!(t.requested_price, dec!(40000));

    let pool = h.desk.pool(pool_id)?;
    let open = pool.open_positions();
    assert_eq!(open[0].entry_price, dec!(40020));
    assert_eq!(open[0].initial_margin, dec!(8004));
    assert_eq!(pool.pool().locked_capital, dec!(8004));

    let d = h.decision(decision_id)?;
    assert!(d.was_executed);
    assert_eq!(d.execution_price, Some(dec!(40020)));
    Ok(())
}

#[tokio::test]
async fn venue_rejection_releases_margin() -> Result<()> {
    let h = Harness::new()?;
    let pool_id = h.add_pool("trend", "balanced", &[BTC])?;
    h.subscribe(pool_id, dec!(100000), tick(0))?;
    route_pool(&h, pool_id, BookType::A)?;
    h.venue
        .push_placement(Err(VenueError::Rejected("insufficient balance".into())));

    h.set_price(BTC, dec!(40000));
    h.source.push(long(BTC, dec!(1), dec!(5)));
    let r = h.run(pool_id, tick(0)).await?;
    let CycleOutcome::ExecutionFailed { decision_id, error, .. } = r.outcome else {
        panic!("expected execution failure, got {:?}", r.outcome);
    };
    assert!(error.contains("insufficient balance"), "{error}");

    let pool = h.desk.pool(pool_id)?;
    assert!(pool.open_positions().is_empty());
    let p = pool.pool();
    assert_eq!(p.locked_capital, Decimal::ZERO);
    assert_eq!(p.available_capital, dec!(100000));

    assert!(!h.decision(decision_id)?.was_executed);
    let trades = h.journal().trade_history(&TradeFilter::default());
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].status, TradeStatus::Failed);
    assert_eq!(trades[0].book_type, BookType::A);
    assert_eq!(trades[0].filled_qty, Decimal::ZERO);
    Ok(())
}

#[tokio::test]
async fn routing_changes_apply_to_the_next_cycle() -> Result<()> {
    let h = Harness::new()?;
    let trend = h.add_pool("trend", "balanced", &[BTC])?;
    let hedge = h.add_pool("hedge", "balanced", &[BTC])?;
    h.subscribe(trend, dec!(100000), tick(0))?;
    h.subscribe(hedge, dec!(100000), tick(0))?;
    h.set_price(BTC, dec!(40000));

    // default B-Book: the venue is never touched
    h.source.push(long(BTC, dec!(0.1), dec!(5)));
    h.run(trend, tick(0)).await?;
    assert!(h.venue.placed().is_empty());

    let mut cfg = h.books().get();
    cfg.strategy_overrides.insert(StrategyId::new("hedge"), BookType::A);
    h.books().replace(cfg)?;

    h.source.push(long(BTC, dec!(0.1), dec!(5)));
    h.run(trend, tick(1)).await?;
    h.source.push(long(BTC, dec!(0.1), dec!(5)));
    let r = h.run(hedge, tick(1)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Opened { .. }), "{:?}", r.outcome);
    assert_eq!(h.venue.placed().len(), 1);

    let books = |pool_id| {
        h.journal()
            .trade_history(&TradeFilter {
                pool_id: Some(pool_id),
                ..TradeFilter::default()
            })
            .into_iter()
            .map(|t| (t.book_type, t.is_simulated))
            .collect::<Vec<_>>()
    };
    assert_eq!(books(trend), vec![(BookType::B, true), (BookType::B, true)]);
    assert_eq!(books(hedge), vec![(BookType::A, false)]);
    Ok(())
}
