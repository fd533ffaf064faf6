//! Daily loss limit 5% on 100,000 capital: three losing trades totalling 5,200
//! close the gate on the third evaluation, and a later recovery the same UTC
//! day does not reopen it.

use std::cell::RefCell;

use aqc_risk::*;
use aqc_schemas::PoolId;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct FakePool {
    pool_id: PoolId,
    realized_today: RefCell<Decimal>,
}

impl RiskInputSource for FakePool {
    fn risk_inputs(&self, pool_id: PoolId, _day: NaiveDate) -> Option<RiskInputs> {
        if pool_id != self.pool_id {
            return None;
        }
        Some(RiskInputs {
            pool_id,
            risk_profile: "balanced".to_string(),
            total_capital: dec!(100000),
            realized_today: *self.realized_today.borrow(),
            unrealized_pnl: Decimal::ZERO,
            gross_exposure: Decimal::ZERO,
            open_positions: 0,
            trades_executed: 0,
        })
    }
}

fn at(h: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 14, 0, 0, 0).unwrap() + Duration::hours(h)
}

#[test]
fn third_losing_trade_closes_gate_for_the_day() {
    let pool = FakePool {
        pool_id: PoolId::new(),
        realized_today: RefCell::new(Decimal::ZERO),
    };
    let mgr = RiskManager::default();
    let mut book = DailyRiskBook::new(pool.pool_id);

    let losses = [dec!(-1500), dec!(-1700), dec!(-2000)];
    let mut verdicts = Vec::new();
    for (i, loss) in losses.iter().enumerate() {
        *pool.realized_today.borrow_mut() += *loss;
        let snap = mgr.evaluate(&pool, &mut book, pool.pool_id, at(i as i64 + 1)).unwrap();
        verdicts.push(snap.can_trade);
        if i == 2 {
            assert_eq!(snap.daily_pnl, dec!(-5200));
            assert_eq!(snap.daily_pnl_pct, dec!(-5.2));
            assert_eq!(snap.pause_reason, Some(PauseReason::MaxDailyLoss));
            assert_eq!(snap.pause_reason.map(|r| r.as_str()), Some("maxDailyLoss"));
        }
    }
    assert_eq!(verdicts, vec![true, true, false]);

    // A winning trade later the same day brings P&L back inside the band.
    *pool.realized_today.borrow_mut() += dec!(4000);
    let snap = mgr.evaluate(&pool, &mut book, pool.pool_id, at(20)).unwrap();
    assert_eq!(snap.daily_pnl, dec!(-1200));
    assert!(!snap.can_trade, "gate must stay closed for the rest of the UTC day");
    assert_eq!(snap.pause_reason, Some(PauseReason::MaxDailyLoss));

    // Next UTC day starts clean.
    *pool.realized_today.borrow_mut() = Decimal::ZERO;
    let snap = mgr.evaluate(&pool, &mut book, pool.pool_id, at(25)).unwrap();
    assert!(snap.can_trade);
}

#[test]
fn unknown_pool_fails_with_pool_not_found() {
    let pool = FakePool {
        pool_id: PoolId::new(),
        realized_today: RefCell::new(Decimal::ZERO),
    };
    let other = PoolId::new();
    let err = RiskManager::default()
        .evaluate(&pool, &mut DailyRiskBook::new(other), other, at(1))
        .unwrap_err();
    assert_eq!(err, RiskError::PoolNotFound(other));
}

#[test]
fn configured_profiles_override_builtins() {
    let mut extra = std::collections::BTreeMap::new();
    let mut tight = RiskProfile::balanced();
    tight.max_daily_loss_pct = dec!(1);
    extra.insert("balanced".to_string(), tight);
    let profiles = RiskProfiles::with_overrides(extra).unwrap();
    assert_eq!(profiles.get("balanced").unwrap().max_daily_loss_pct, dec!(1));
    assert_eq!(profiles.get("aggressive").unwrap().max_leverage, dec!(10));

    let mut bad = std::collections::BTreeMap::new();
    let mut p = RiskProfile::conservative();
    p.max_leverage = dec!(0.5);
    bad.insert("broken".to_string(), p);
    assert!(matches!(
        RiskProfiles::with_overrides(bad),
        Err(RiskError::InvalidProfile { .. })
    ));
}
