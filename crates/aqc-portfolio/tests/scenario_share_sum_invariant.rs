//! Share sum and capital split hold after every mutation of a busy pool.

use aqc_portfolio::{LedgerParams, PoolLedger};
use aqc_schemas::{PoolId, StrategyId, UserId};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn assert_invariants(l: &PoolLedger) {
    let p = l.pool();
    assert_eq!(p.available_capital + p.locked_capital, p.total_capital);
    let sum: Decimal = l.shares().map(|s| s.shares_owned).sum();
    assert!((sum - p.total_shares_outstanding).abs() <= dec!(0.00000001));
    assert!(l.verify().is_ok(), "{:?}", l.verify());
}

#[test]
fn invariants_hold_through_mixed_activity() {
    let t0 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let mut l = PoolLedger::new(PoolId::new(), StrategyId::new("grid"), LedgerParams::default(), t0);

    let amounts = [dec!(1000), dec!(2500.5), dec!(333.33), dec!(12000), dec!(777)];
    let pnls = [dec!(120.5), dec!(-80.25), dec!(33.3333), dec!(-5.1), dec!(410)];
    let mut orders = Vec::new();
    for (i, (a, pnl)) in amounts.iter().zip(pnls.iter()).enumerate() {
        let now = t0 + Duration::hours(i as i64);
        let (o, _) = l.open_subscription(UserId::new(format!("u{i}")), *a, now).unwrap();
        orders.push(o.id);
        assert_invariants(&l);
        l.reserve_margin(dec!(100), now).unwrap();
        assert_invariants(&l);
        l.apply_unrealized(dec!(12.345) * Decimal::from(i as i64), now).unwrap();
        assert_invariants(&l);
        l.release_margin(dec!(100), now).unwrap();
        l.settle_trade(*pnl, now).unwrap();
        assert_invariants(&l);
    }

    l.top_up(orders[0], dec!(150), t0 + Duration::days(2)).unwrap();
    assert_invariants(&l);
    l.apply_unrealized(dec!(0), t0 + Duration::days(2)).unwrap();

    l.redeem(orders[1], t0 + Duration::days(3)).unwrap();
    assert_invariants(&l);
    l.liquidate(orders[3], t0 + Duration::days(4)).unwrap();
    assert_invariants(&l);
    l.redeem(orders[2], t0 + Duration::days(60)).unwrap();
    assert_invariants(&l);

    let pct: Decimal = l.shares().map(|s| s.share_percentage).sum();
    assert!((pct - dec!(100)).abs() < dec!(0.0001));
    assert!(!l.is_frozen());
}
