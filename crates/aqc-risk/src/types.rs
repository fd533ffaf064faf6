use std::collections::BTreeMap;

use aqc_portfolio::PositionLimits;
use aqc_schemas::PoolId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Risk parameter set. All limits are percentages (5 = 5%) of pool capital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskProfile {
    pub max_daily_loss_pct: Decimal,
    pub max_daily_profit_pct: Decimal,
    pub target_daily_return_pct: Decimal,
    pub max_position_pct: Decimal,
    pub max_total_exposure_pct: Decimal,
    pub max_leverage: Decimal,
}

impl RiskProfile {
    pub fn conservative() -> Self {
        Self {
            max_daily_loss_pct: Decimal::from(2),
            max_daily_profit_pct: Decimal::from(5),
            target_daily_return_pct: Decimal::new(5, 1),
            max_position_pct: Decimal::from(10),
            max_total_exposure_pct: Decimal::from(100),
            max_leverage: Decimal::from(3),
        }
    }

    pub fn balanced() -> Self {
        Self {
            max_daily_loss_pct: Decimal::from(5),
            max_daily_profit_pct: Decimal::from(10),
            target_daily_return_pct: Decimal::ONE,
            max_position_pct: Decimal::from(20),
            max_total_exposure_pct: Decimal::from(200),
            max_leverage: Decimal::from(5),
        }
    }

    pub fn aggressive() -> Self {
        Self {
            max_daily_loss_pct: Decimal::from(10),
            max_daily_profit_pct: Decimal::from(20),
            target_daily_return_pct: Decimal::from(2),
            max_position_pct: Decimal::from(30),
            max_total_exposure_pct: Decimal::from(400),
            max_leverage: Decimal::from(10),
        }
    }

    /// Limits handed to the position book.
    pub fn position_limits(&self) -> PositionLimits {
        PositionLimits {
            max_position_pct: self.max_position_pct,
            max_leverage: self.max_leverage,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("max_daily_loss_pct", self.max_daily_loss_pct),
            ("max_daily_profit_pct", self.max_daily_profit_pct),
            ("max_position_pct", self.max_position_pct),
            ("max_total_exposure_pct", self.max_total_exposure_pct),
        ];
        for (name, v) in positive {
            if v <= Decimal::ZERO {
                return Err(format!("{name} must be > 0, got {v}"));
            }
        }
        if self.target_daily_return_pct < Decimal::ZERO {
            return Err(format!(
                "target_daily_return_pct must be >= 0, got {}",
                self.target_daily_return_pct
            ));
        }
        if self.max_leverage < Decimal::ONE {
            return Err(format!("max_leverage must be >= 1, got {}", self.max_leverage));
        }
        Ok(())
    }
}

/// Profiles looked up by name. Starts with the three built-ins; configured
/// profiles are added or replace them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfiles {
    profiles: BTreeMap<String, RiskProfile>,
}

impl Default for RiskProfiles {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("conservative".to_string(), RiskProfile::conservative());
        profiles.insert("balanced".to_string(), RiskProfile::balanced());
        profiles.insert("aggressive".to_string(), RiskProfile::aggressive());
        Self { profiles }
    }
}

impl RiskProfiles {
    /// Built-ins overlaid with `extra`. Invalid profiles are rejected.
    pub fn with_overrides(extra: BTreeMap<String, RiskProfile>) -> Result<Self, RiskError> {
        let mut out = Self::default();
        for (name, p) in extra {
            p.validate()
                .map_err(|reason| RiskError::InvalidProfile { name: name.clone(), reason })?;
            out.profiles.insert(name, p);
        }
        Ok(out)
    }

    pub fn get(&self, name: &str) -> Result<&RiskProfile, RiskError> {
        self.profiles
            .get(name)
            .ok_or_else(|| RiskError::UnknownProfile(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RiskProfile)> {
        self.profiles.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Everything `evaluate` needs about one pool, gathered by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    pub pool_id: PoolId,
    pub risk_profile: String,
    pub total_capital: Decimal,
    /// P&L of positions closed today (UTC).
    pub realized_today: Decimal,
    /// Current unrealized P&L of open positions.
    pub unrealized_pnl: Decimal,
    /// Sum of open notional.
    pub gross_exposure: Decimal,
    pub open_positions: u32,
    /// Executed decisions today.
    pub trades_executed: u32,
}

/// First violated condition that closed the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    MaxDailyLoss,
    MaxDailyProfit,
    MaxTotalExposure,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxDailyLoss => "maxDailyLoss",
            Self::MaxDailyProfit => "maxDailyProfit",
            Self::MaxTotalExposure => "maxTotalExposure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "maxDailyLoss" => Some(Self::MaxDailyLoss),
            "maxDailyProfit" => Some(Self::MaxDailyProfit),
            "maxTotalExposure" => Some(Self::MaxTotalExposure),
            _ => None,
        }
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pool, per-UTC-day risk view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub pool_id: PoolId,
    pub day: NaiveDate,
    pub risk_profile: String,
    pub daily_pnl: Decimal,
    pub daily_pnl_pct: Decimal,
    pub exposure_pct: Decimal,
    pub can_trade: bool,
    pub pause_reason: Option<PauseReason>,
    pub max_loss_remaining: Decimal,
    pub max_profit_remaining: Decimal,
    pub target_reached: bool,
    pub open_positions: u32,
    pub trades_executed: u32,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("pool {0} not found")]
    PoolNotFound(PoolId),
    #[error("unknown risk profile {0:?}")]
    UnknownProfile(String),
    #[error("invalid risk profile {name:?}: {reason}")]
    InvalidProfile { name: String, reason: String },
}
