use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use aqc_execution::{BookRoutingConfig, VenuePolicy};
use aqc_portfolio::LedgerParams;
use aqc_risk::{RiskProfile, RiskProfiles};
use aqc_schemas::{PoolId, StrategyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ConfigError;

/// Namespace for pool ids derived from strategy ids.
const POOL_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6171_632d_706f_6f6c_2d69_642d_7631_0000);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeskSettings {
    pub ledger: LedgerParams,
    pub positions: PositionSettings,
    pub risk: RiskSettings,
    pub book: BookRoutingConfig,
    pub execution: ExecutionSettings,
    pub runtime: RuntimeSettings,
    pub venue: VenueSettings,
    pub pools: Vec<PoolSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PositionSettings {
    /// Fraction of initial margin lost at which a position is force-closed.
    pub maintenance_margin_buffer: Decimal,
    /// Headroom, in percent of estimated margin, reserved before an entry is sent.
    pub margin_reservation_buffer_pct: Decimal,
}

impl Default for PositionSettings {
    fn default() -> Self {
        Self {
            maintenance_margin_buffer: Decimal::new(9, 1),
            margin_reservation_buffer_pct: Decimal::ONE,
        }
    }
}

/// Extra or replacement profiles on top of the built-ins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskSettings {
    pub profiles: BTreeMap<String, RiskProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionSettings {
    pub venue_timeout_ms: u64,
    pub confirm_attempts: u32,
    pub confirm_interval_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        let p = VenuePolicy::default();
        Self {
            venue_timeout_ms: p.timeout.as_millis() as u64,
            confirm_attempts: p.confirm_attempts,
            confirm_interval_ms: p.confirm_interval.as_millis() as u64,
        }
    }
}

impl ExecutionSettings {
    pub fn policy(&self) -> VenuePolicy {
        VenuePolicy {
            timeout: Duration::from_millis(self.venue_timeout_ms),
            confirm_attempts: self.confirm_attempts,
            confirm_interval: Duration::from_millis(self.confirm_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    pub cycle_interval_secs: u64,
    pub journal_path: PathBuf,
    pub hash_chain: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60,
            journal_path: PathBuf::from("var/journal/aqc.jsonl"),
            hash_chain: true,
        }
    }
}

impl RuntimeSettings {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VenueSettings {
    pub keys_env: KeysEnv,
}

/// Env var NAMES holding the live venue credentials. Never the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeysEnv {
    pub api_key: String,
    pub api_secret: String,
}

impl Default for KeysEnv {
    fn default() -> Self {
        Self {
            api_key: "AQC_VENUE_API_KEY".to_string(),
            api_secret: "AQC_VENUE_API_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSettings {
    /// Fixed id; derived from `strategy_id` when absent.
    #[serde(default)]
    pub pool_id: Option<PoolId>,
    pub strategy_id: StrategyId,
    #[serde(default = "default_profile")]
    pub risk_profile: String,
    pub symbols: Vec<String>,
}

fn default_profile() -> String {
    "balanced".to_string()
}

impl PoolSettings {
    /// Stable across restarts: the configured id, else a v5 uuid of the strategy id.
    pub fn resolved_pool_id(&self) -> PoolId {
        self.pool_id.unwrap_or_else(|| {
            PoolId(Uuid::new_v5(
                &POOL_ID_NAMESPACE,
                self.strategy_id.as_str().as_bytes(),
            ))
        })
    }
}

impl DeskSettings {
    pub fn from_json(v: &Value) -> Result<Self, ConfigError> {
        let settings: DeskSettings = serde_json::from_value(v.clone())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in profiles with configured overrides applied.
    pub fn risk_profiles(&self) -> Result<RiskProfiles, ConfigError> {
        RiskProfiles::with_overrides(self.risk.profiles.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let l = &self.ledger;
        if l.min_subscription <= Decimal::ZERO {
            return invalid("ledger.min_subscription must be positive".into());
        }
        if l.early_redemption_penalty_pct < Decimal::ZERO
            || l.early_redemption_penalty_pct > Decimal::ONE_HUNDRED
        {
            return invalid("ledger.early_redemption_penalty_pct must be within [0, 100]".into());
        }
        if l.lock_period_days < 0 {
            return invalid("ledger.lock_period_days must not be negative".into());
        }
        if l.initial_nav_per_share <= Decimal::ZERO {
            return invalid("ledger.initial_nav_per_share must be positive".into());
        }
        if l.reconcile_tolerance < Decimal::ZERO {
            return invalid("ledger.reconcile_tolerance must not be negative".into());
        }

        let p = &self.positions;
        if p.maintenance_margin_buffer <= Decimal::ZERO || p.maintenance_margin_buffer > Decimal::ONE
        {
            return invalid("positions.maintenance_margin_buffer must be within (0, 1]".into());
        }
        if p.margin_reservation_buffer_pct < Decimal::ZERO {
            return invalid("positions.margin_reservation_buffer_pct must not be negative".into());
        }

        self.book
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("book: {e}")))?;

        if self.execution.venue_timeout_ms == 0 {
            return invalid("execution.venue_timeout_ms must be positive".into());
        }
        if self.runtime.cycle_interval_secs == 0 {
            return invalid("runtime.cycle_interval_secs must be positive".into());
        }

        let profiles = self.risk_profiles()?;
        let mut seen = BTreeSet::new();
        for pool in &self.pools {
            let id = pool.resolved_pool_id();
            if !seen.insert(id) {
                return invalid(format!("pools: duplicate pool id {id}"));
            }
            if pool.strategy_id.as_str().trim().is_empty() {
                return invalid(format!("pools[{id}]: empty strategy_id"));
            }
            if pool.symbols.is_empty() || pool.symbols.iter().any(|s| s.trim().is_empty()) {
                return invalid(format!("pools[{id}]: symbols must be non-empty"));
            }
            if profiles.get(&pool.risk_profile).is_err() {
                return invalid(format!(
                    "pools[{id}]: unknown risk profile '{}'",
                    pool.risk_profile
                ));
            }
        }
        Ok(())
    }
}
