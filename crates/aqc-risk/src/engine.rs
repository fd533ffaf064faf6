use std::collections::BTreeMap;

use aqc_schemas::PoolId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{PauseReason, RiskError, RiskInputs, RiskProfile, RiskProfiles, RiskSnapshot};

/// Days of snapshots kept per pool.
const HISTORY_DAYS: usize = 31;

/// Where `evaluate` gets the current state of a pool. `None` = unknown pool.
pub trait RiskInputSource {
    fn risk_inputs(&self, pool_id: PoolId, day: NaiveDate) -> Option<RiskInputs>;
}

// ---------------------------------------------------------------------------
// Per-pool daily state
// ---------------------------------------------------------------------------

/// Snapshot history of one pool, keyed by UTC date.
///
/// The date key makes the daily reset implicit: the first evaluation on a new
/// date finds no entry and starts with an open gate.
#[derive(Debug, Clone)]
pub struct DailyRiskBook {
    pool_id: PoolId,
    days: BTreeMap<NaiveDate, RiskSnapshot>,
}

impl DailyRiskBook {
    pub fn new(pool_id: PoolId) -> Self {
        Self {
            pool_id,
            days: BTreeMap::new(),
        }
    }

    /// Seed from persisted snapshots (e.g. today's row after a restart).
    pub fn restore(pool_id: PoolId, snapshots: Vec<RiskSnapshot>) -> Self {
        let mut book = Self::new(pool_id);
        for s in snapshots.into_iter().filter(|s| s.pool_id == pool_id) {
            book.days.insert(s.day, s);
        }
        book
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn get(&self, day: NaiveDate) -> Option<&RiskSnapshot> {
        self.days.get(&day)
    }

    pub fn latest(&self) -> Option<&RiskSnapshot> {
        self.days.values().next_back()
    }

    /// Store `fresh` for its day, keeping a closed gate closed.
    ///
    /// If an earlier snapshot for the same day already had `can_trade = false`,
    /// the gate and its first pause reason are carried over regardless of the
    /// fresh figures.
    pub fn latch(&mut self, mut fresh: RiskSnapshot) -> RiskSnapshot {
        if let Some(prev) = self.days.get(&fresh.day) {
            if !prev.can_trade {
                fresh.can_trade = false;
                fresh.pause_reason = prev.pause_reason;
            }
        }
        self.days.insert(fresh.day, fresh.clone());
        while self.days.len() > HISTORY_DAYS {
            if let Some(oldest) = self.days.keys().next().copied() {
                self.days.remove(&oldest);
            }
        }
        fresh
    }
}

// ---------------------------------------------------------------------------
// Pure snapshot computation
// ---------------------------------------------------------------------------

fn pct_of(amount: Decimal, capital: Decimal) -> Decimal {
    (amount * Decimal::ONE_HUNDRED / capital).round_dp(4)
}

/// Stateless snapshot for one pool and day. No latching.
pub fn compute_snapshot(
    profile_name: &str,
    profile: &RiskProfile,
    inputs: &RiskInputs,
    now: DateTime<Utc>,
) -> RiskSnapshot {
    let capital = inputs.total_capital;
    let daily_pnl = inputs.realized_today + inputs.unrealized_pnl;

    let (daily_pnl_pct, exposure_pct) = if capital > Decimal::ZERO {
        (pct_of(daily_pnl, capital), pct_of(inputs.gross_exposure, capital))
    } else if inputs.gross_exposure > Decimal::ZERO {
        // Exposure without capital can only be over the limit.
        (Decimal::ZERO, Decimal::MAX)
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let pause_reason = if daily_pnl_pct <= -profile.max_daily_loss_pct {
        Some(PauseReason::MaxDailyLoss)
    } else if daily_pnl_pct >= profile.max_daily_profit_pct {
        Some(PauseReason::MaxDailyProfit)
    } else if exposure_pct >= profile.max_total_exposure_pct {
        Some(PauseReason::MaxTotalExposure)
    } else {
        None
    };

    let loss_budget = capital * profile.max_daily_loss_pct / Decimal::ONE_HUNDRED;
    let profit_budget = capital * profile.max_daily_profit_pct / Decimal::ONE_HUNDRED;

    RiskSnapshot {
        pool_id: inputs.pool_id,
        day: now.date_naive(),
        risk_profile: profile_name.to_string(),
        daily_pnl,
        daily_pnl_pct,
        exposure_pct,
        can_trade: pause_reason.is_none(),
        pause_reason,
        max_loss_remaining: (loss_budget + daily_pnl).max(Decimal::ZERO),
        max_profit_remaining: (profit_budget - daily_pnl).max(Decimal::ZERO),
        target_reached: daily_pnl_pct >= profile.target_daily_return_pct,
        open_positions: inputs.open_positions,
        trades_executed: inputs.trades_executed,
        evaluated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RiskManager {
    profiles: RiskProfiles,
}

impl RiskManager {
    pub fn new(profiles: RiskProfiles) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &RiskProfiles {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Result<&RiskProfile, RiskError> {
        self.profiles.get(name)
    }

    /// Recompute today's snapshot for `pool_id` and latch it into `book`.
    ///
    /// Fails only for an unknown pool or profile; hitting a limit is reported
    /// through `can_trade` / `pause_reason`.
    pub fn evaluate<S: RiskInputSource + ?Sized>(
        &self,
        source: &S,
        book: &mut DailyRiskBook,
        pool_id: PoolId,
        now: DateTime<Utc>,
    ) -> Result<RiskSnapshot, RiskError> {
        let inputs = source
            .risk_inputs(pool_id, now.date_naive())
            .ok_or(RiskError::PoolNotFound(pool_id))?;
        self.evaluate_inputs(&inputs, book, now)
    }

    /// Same as [`evaluate`](Self::evaluate) with inputs already gathered.
    pub fn evaluate_inputs(
        &self,
        inputs: &RiskInputs,
        book: &mut DailyRiskBook,
        now: DateTime<Utc>,
    ) -> Result<RiskSnapshot, RiskError> {
        if book.pool_id() != inputs.pool_id {
            return Err(RiskError::PoolNotFound(inputs.pool_id));
        }
        let profile = self.profiles.get(&inputs.risk_profile)?;
        let fresh = compute_snapshot(&inputs.risk_profile, profile, inputs, now);
        Ok(book.latch(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn inputs(pool_id: PoolId, realized: Decimal, exposure: Decimal) -> RiskInputs {
        RiskInputs {
            pool_id,
            risk_profile: "balanced".into(),
            total_capital: dec!(100000),
            realized_today: realized,
            unrealized_pnl: dec!(0),
            gross_exposure: exposure,
            open_positions: 0,
            trades_executed: 0,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn fresh_snapshot_within_limits_can_trade() {
        let s = compute_snapshot("balanced", &RiskProfile::balanced(), &inputs(PoolId::new(), dec!(-1000), dec!(50000)), noon());
        assert!(s.can_trade);
        assert_eq!(s.daily_pnl_pct, dec!(-1));
        assert_eq!(s.exposure_pct, dec!(50));
        assert_eq!(s.max_loss_remaining, dec!(4000));
        assert_eq!(s.max_profit_remaining, dec!(11000));
    }

    #[test]
    fn loss_is_checked_before_exposure() {
        let s = compute_snapshot("balanced", &RiskProfile::balanced(), &inputs(PoolId::new(), dec!(-6000), dec!(300000)), noon());
        assert_eq!(s.pause_reason, Some(PauseReason::MaxDailyLoss));
        assert_eq!(s.max_loss_remaining, dec!(0));
    }

    #[test]
    fn exposure_limit_pauses() {
        let s = compute_snapshot("balanced", &RiskProfile::balanced(), &inputs(PoolId::new(), dec!(0), dec!(200000)), noon());
        assert!(!s.can_trade);
        assert_eq!(s.pause_reason, Some(PauseReason::MaxTotalExposure));
    }

    #[test]
    fn zero_capital_is_guarded() {
        let mut i = inputs(PoolId::new(), dec!(0), dec!(0));
        i.total_capital = dec!(0);
        let s = compute_snapshot("balanced", &RiskProfile::balanced(), &i, noon());
        assert!(s.can_trade);
        i.gross_exposure = dec!(1);
        let s = compute_snapshot("balanced", &RiskProfile::balanced(), &i, noon());
        assert_eq!(s.pause_reason, Some(PauseReason::MaxTotalExposure));
    }

    #[test]
    fn gate_is_sticky_within_the_day_and_resets_next_day() {
        let pool = PoolId::new();
        let mgr = RiskManager::default();
        let mut book = DailyRiskBook::new(pool);

        let s = mgr.evaluate_inputs(&inputs(pool, dec!(12000), dec!(0)), &mut book, noon()).unwrap();
        assert_eq!(s.pause_reason, Some(PauseReason::MaxDailyProfit));

        // P&L falls back and then breaches the loss side: first reason is kept.
        let s = mgr.evaluate_inputs(&inputs(pool, dec!(-7000), dec!(0)), &mut book, noon() + Duration::hours(1)).unwrap();
        assert!(!s.can_trade);
        assert_eq!(s.pause_reason, Some(PauseReason::MaxDailyProfit));

        let s = mgr.evaluate_inputs(&inputs(pool, dec!(0), dec!(0)), &mut book, noon() + Duration::hours(2)).unwrap();
        assert!(!s.can_trade);

        let s = mgr.evaluate_inputs(&inputs(pool, dec!(0), dec!(0)), &mut book, noon() + Duration::hours(13)).unwrap();
        assert!(s.can_trade);
        assert_eq!(s.pause_reason, None);
        assert_eq!(book.latest().map(|s| s.day), Some(noon().date_naive() + Duration::days(1)));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let pool = PoolId::new();
        let mut i = inputs(pool, dec!(0), dec!(0));
        i.risk_profile = "yolo".into();
        let err = RiskManager::default()
            .evaluate_inputs(&i, &mut DailyRiskBook::new(pool), noon())
            .unwrap_err();
        assert_eq!(err, RiskError::UnknownProfile("yolo".into()));
    }

    #[test]
    fn history_is_bounded() {
        let pool = PoolId::new();
        let mgr = RiskManager::default();
        let mut book = DailyRiskBook::new(pool);
        for d in 0..40 {
            mgr.evaluate_inputs(&inputs(pool, dec!(0), dec!(0)), &mut book, noon() + Duration::days(d)).unwrap();
        }
        assert_eq!(book.days.len(), HISTORY_DAYS);
        assert!(book.get(noon().date_naive()).is_none());
    }
}
