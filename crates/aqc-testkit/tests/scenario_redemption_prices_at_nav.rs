//! Scenario: investors redeem at the NAV the pool trades its way to.
//!
//! A 20,000 pool (19,000 + 1,000) takes a 0.4 BTC long at 40,000 with a
//! take-profit at 45,000. The take-profit fires on the next mark and
//! realizes 2,000, lifting NAV to 1.10.
//!
//! # Invariants under test
//!
//! 1. A take-profit crossing closes the position in the following cycle,
//!    back-fills the opening decision and moves NAV by the realized P&L.
//! 2. Redeeming 1,000 shares after the lock period pays 1,000 x 1.10 = 1,100
//!    with no penalty.
//! 3. Redeeming inside the lock period withholds 2% of principal (20) from
//!    the same 1,100 gross.
//! 4. The ledger stays reconciled: remaining shares times NAV equals the
//!    pool value after each redemption.

use anyhow::Result;
use aqc_portfolio::InvestmentOrder;
use aqc_runtime::CycleOutcome;
use aqc_schemas::{CloseReason, PoolId};
use aqc_testkit::{long, tick, Harness};
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Pool at NAV 1.10 and the 1,000 order to redeem.
async fn pool_at_nav_110(h: &Harness) -> Result<(PoolId, InvestmentOrder)> {
    let pool_id = h.add_pool("trend", "balanced", &["BTCUSDT"])?;
    h.subscribe(pool_id, dec!(19000), tick(0))?;
    let order = h.subscribe(pool_id, dec!(1000), tick(0))?;

    h.set_price("BTCUSDT", dec!(40000));
    let mut entry = long("BTCUSDT", dec!(0.4), dec!(5));
    entry.take_profit = Some(dec!(45000));
    h.source.push(entry);
    let r = h.run(pool_id, tick(0)).await?;
    let CycleOutcome::Opened { decision_id, .. } = r.outcome else {
        panic!("expected open, got {:?}", r.outcome);
    };

    h.set_price("BTCUSDT", dec!(45000));
    h.source.push_none();
    let r = h.run(pool_id, tick(1)).await?;
    assert_eq!(r.outcome, CycleOutcome::NoDecision);
    assert_eq!(r.trigger_closes.len(), 1);
    assert_eq!(r.trigger_closes[0].reason, CloseReason::TakeProfit);
    assert_eq!(r.trigger_closes[0].realized_pnl, dec!(2000));

    let opening = h.decision(decision_id)?;
    assert_eq!(opening.outcome_pnl, Some(dec!(2000)));
    assert_eq!(opening.was_successful, Some(true));

    let p = h.desk.pool(pool_id)?.pool();
    assert_eq!(p.realized_pnl, dec!(2000));
    assert_eq!(p.current_nav_per_share, dec!(1.1));
    Ok((pool_id, order))
}

#[tokio::test]
async fn redemption_after_lock_pays_full_nav() -> Result<()> {
    let h = Harness::new()?;
    let (pool_id, order) = pool_at_nav_110(&h).await?;

    let r = h.desk.redeem(order.id, tick(0) + Duration::days(31))?;
    assert!(!r.early);
    assert_eq!(r.shares_redeemed, dec!(1000));
    assert_eq!(r.nav_per_share, dec!(1.1));
    assert_eq!(r.gross_amount, dec!(1100));
    assert_eq!(r.penalty, Decimal::ZERO);
    assert_eq!(r.redemption_amount, dec!(1100));

    let p = h.desk.pool(pool_id)?.pool();
    assert_eq!(p.total_shares_outstanding, dec!(19000));
    assert_eq!(p.value(), dec!(20900));
    assert_eq!(p.current_nav_per_share, dec!(1.1));
    Ok(())
}

#[tokio::test]
async fn early_redemption_withholds_penalty_on_principal() -> Result<()> {
    let h = Harness::new()?;
    let (pool_id, order) = pool_at_nav_110(&h).await?;

    let r = h.desk.redeem(order.id, tick(0) + Duration::days(1))?;
    assert!(r.early);
    assert_eq!(r.gross_amount, dec!(1100));
    assert_eq!(r.penalty, dec!(20));
    assert_eq!(r.redemption_amount, dec!(1080));

    // The penalty stays with the remaining investors.
    let p = h.desk.pool(pool_id)?.pool();
    assert_eq!(p.total_shares_outstanding, dec!(19000));
    assert_eq!(p.value(), dec!(20920));
    assert!(p.current_nav_per_share > dec!(1.1));

    // A redeemed order cannot be redeemed again.
    assert!(h.desk.redeem(order.id, tick(0) + Duration::days(2)).is_err());
    Ok(())
}
