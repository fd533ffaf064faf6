//! Scenario: a desk assembled from layered YAML trades as configured.
//!
//! The base layer declares two pools and exact B-Book fills; the overlay adds
//! a custom risk profile and routes the hedge strategy to the A-Book.
//!
//! # Invariants under test
//!
//! 1. Configured pools are registered under ids derived from their strategy
//!    ids, with the configured risk profile.
//! 2. The strategy override sends the hedge pool's entry to the live venue
//!    while the other pool stays on the simulator.
//! 3. Configured ledger parameters apply to subscriptions.

use anyhow::Result;
use aqc_config::load_layered_yaml_from_strings;
use aqc_journal::TradeFilter;
use aqc_runtime::CycleOutcome;
use aqc_schemas::BookType;
use aqc_testkit::{long, tick, Harness};
use rust_decimal_macros::dec;

const BASE_YAML: &str = r#"
ledger:
  min_subscription: 500
book:
  default_book: B
  simulation:
    delay_ms_min: 0
    delay_ms_max: 0
    slippage_min: 0.0
    slippage_max: 0.0
    fill_rate: 1.0
execution:
  venue_timeout_ms: 2000
  confirm_attempts: 2
  confirm_interval_ms: 1
pools:
  - strategy_id: "momentum-v1"
    symbols: ["BTCUSDT"]
  - strategy_id: "hedge-v1"
    risk_profile: tight
    symbols: ["BTCUSDT"]
"#;

const OVERLAY_YAML: &str = r#"
book:
  strategy_overrides:
    hedge-v1: A
risk:
  profiles:
    tight:
      max_daily_loss_pct: 1
      max_daily_profit_pct: 3
      target_daily_return_pct: 0.3
      max_position_pct: 5
      max_total_exposure_pct: 50
      max_leverage: 2
"#;

#[tokio::test]
async fn configured_pools_route_per_strategy() -> Result<()> {
    let settings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML])?.settings()?;
    let h = Harness::from_settings(&settings)?;

    let momentum = settings.pools[0].resolved_pool_id();
    let hedge = settings.pools[1].resolved_pool_id();
    assert_eq!(h.desk.pool_ids().len(), 2);
    assert_eq!(h.desk.pool(momentum)?.spec().risk_profile, "balanced");
    assert_eq!(h.desk.pool(hedge)?.spec().risk_profile, "tight");

    assert!(h.subscribe(momentum, dec!(400), tick(0)).is_err());
    h.subscribe(momentum, dec!(100000), tick(0))?;
    h.subscribe(hedge, dec!(100000), tick(0))?;
    h.set_price("BTCUSDT", dec!(40000));

    h.source.push(long("BTCUSDT", dec!(0.1), dec!(2)));
    let r = h.run(momentum, tick(0)).await?;
    assert!(matches!(r.outcome, CycleOutcome::Opened { .. }), "{:?}", r.outcome);
    assert!(h.venue.placed().is_empty());

    h.source.push(long("BTCUSDT", dec!(0.1), dec!(2)));
    let r = h.run(hedge, tick(0)).await?;
    let CycleOutcome::Opened { avg_price, .. } = r.outcome else {
        panic!("expected open, got {:?}", r.outcome);
    };
    assert_eq!(avg_price, dec!(40000));
    assert_eq!(h.venue.placed().len(), 1);

    let hedge_trades = h.journal().trade_history(&TradeFilter {
        pool_id: Some(hedge),
        ..TradeFilter::default()
    });
    assert_eq!(hedge_trades.len(), 1);
    assert_eq!(hedge_trades[0].book_type, BookType::A);
    assert!(!hedge_trades[0].is_simulated);

    let p = h.desk.pool(hedge)?.pool();
    assert_eq!(p.locked_capital, dec!(2000));
    assert_eq!(p.available_capital, dec!(98000));
    Ok(())
}
