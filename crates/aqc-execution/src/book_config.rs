use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use aqc_schemas::{BookType, PoolId, StrategyId};
use serde::{Deserialize, Serialize};

/// B-Book fill model. Ranges are inclusive and drawn uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationParams {
    pub delay_ms_min: u64,
    pub delay_ms_max: u64,
    /// Fraction of price, e.g. 0.0005 = 5 bp.
    pub slippage_min: f64,
    pub slippage_max: f64,
    /// Probability of a complete fill.
    pub fill_rate: f64,
    /// Fraction of requested size filled when the fill-rate draw misses.
    pub partial_fill_min: f64,
    pub partial_fill_max: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            delay_ms_min: 50,
            delay_ms_max: 500,
            slippage_min: 0.0001,
            slippage_max: 0.001,
            fill_rate: 0.95,
            partial_fill_min: 0.5,
            partial_fill_max: 0.95,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), BookConfigError> {
        let bad = |msg: String| Err(BookConfigError::InvalidSimulation(msg));
        if self.delay_ms_min > self.delay_ms_max {
            return bad(format!(
                "delay_ms_min {} > delay_ms_max {}",
                self.delay_ms_min, self.delay_ms_max
            ));
        }
        if !(0.0..1.0).contains(&self.slippage_min)
            || !(0.0..1.0).contains(&self.slippage_max)
            || self.slippage_min > self.slippage_max
        {
            return bad(format!(
                "slippage range [{}, {}] must satisfy 0 <= min <= max < 1",
                self.slippage_min, self.slippage_max
            ));
        }
        if !(0.0..=1.0).contains(&self.fill_rate) {
            return bad(format!("fill_rate {} must be within [0, 1]", self.fill_rate));
        }
        if !(self.partial_fill_min > 0.0
            && self.partial_fill_min <= self.partial_fill_max
            && self.partial_fill_max <= 1.0)
        {
            return bad(format!(
                "partial fill range [{}, {}] must satisfy 0 < min <= max <= 1",
                self.partial_fill_min, self.partial_fill_max
            ));
        }
        Ok(())
    }
}

/// A/B book routing table plus the simulation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookRoutingConfig {
    pub default_book: BookType,
    pub pool_overrides: BTreeMap<PoolId, BookType>,
    pub strategy_overrides: BTreeMap<StrategyId, BookType>,
    pub simulation: SimulationParams,
}

impl Default for BookRoutingConfig {
    fn default() -> Self {
        Self {
            default_book: BookType::B,
            pool_overrides: BTreeMap::new(),
            strategy_overrides: BTreeMap::new(),
            simulation: SimulationParams::default(),
        }
    }
}

impl BookRoutingConfig {
    /// Pool override, then strategy override, then the default.
    pub fn route(&self, pool_id: PoolId, strategy_id: &StrategyId) -> BookType {
        self.pool_overrides
            .get(&pool_id)
            .or_else(|| self.strategy_overrides.get(strategy_id))
            .copied()
            .unwrap_or(self.default_book)
    }

    /// True when any route can reach the A-Book.
    pub fn routes_to_a(&self) -> bool {
        self.default_book == BookType::A
            || self.pool_overrides.values().any(|b| *b == BookType::A)
            || self.strategy_overrides.values().any(|b| *b == BookType::A)
    }

    pub fn validate(&self) -> Result<(), BookConfigError> {
        self.simulation.validate()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookConfigError {
    #[error("invalid simulation parameters: {0}")]
    InvalidSimulation(String),
}

/// Shared, runtime-adjustable routing config. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct BookConfigStore {
    inner: Arc<RwLock<BookRoutingConfig>>,
}

impl BookConfigStore {
    pub fn new(cfg: BookRoutingConfig) -> Result<Self, BookConfigError> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(cfg)),
        })
    }

    /// Copy of the current config.
    pub fn get(&self) -> BookRoutingConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole config. Invalid configs leave the current one in place.
    pub fn replace(&self, cfg: BookRoutingConfig) -> Result<(), BookConfigError> {
        cfg.validate()?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = cfg;
        Ok(())
    }

    pub fn route(&self, pool_id: PoolId, strategy_id: &StrategyId) -> BookType {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .route(pool_id, strategy_id)
    }

    pub fn simulation(&self) -> SimulationParams {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .simulation
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_pool_then_strategy_then_default() {
        let pool = PoolId::new();
        let other_pool = PoolId::new();
        let strat = StrategyId::new("s1");
        let mut cfg = BookRoutingConfig::default();
        assert_eq!(cfg.route(pool, &strat), BookType::B);

        cfg.strategy_overrides.insert(strat.clone(), BookType::A);
        assert_eq!(cfg.route(pool, &strat), BookType::A);

        cfg.pool_overrides.insert(pool, BookType::B);
        assert_eq!(cfg.route(pool, &strat), BookType::B);
        assert_eq!(cfg.route(other_pool, &strat), BookType::A);
        assert_eq!(cfg.route(other_pool, &StrategyId::new("s2")), BookType::B);
    }

    #[test]
    fn any_a_route_is_detected() {
        let mut cfg = BookRoutingConfig::default();
        assert!(!cfg.routes_to_a());
        cfg.pool_overrides.insert(PoolId::new(), BookType::B);
        assert!(!cfg.routes_to_a());
        cfg.strategy_overrides.insert(StrategyId::new("hedge"), BookType::A);
        assert!(cfg.routes_to_a());
    }

    #[test]
    fn store_rejects_invalid_update() {
        let store = BookConfigStore::default();
        let mut cfg = store.get();
        cfg.simulation.partial_fill_min = 0.99;
        cfg.simulation.partial_fill_max = 0.5;
        assert!(store.replace(cfg).is_err());
        assert_eq!(store.get().simulation, SimulationParams::default());

        let mut cfg = store.get();
        cfg.default_book = BookType::A;
        store.replace(cfg).unwrap();
        let clone = store.clone();
        assert_eq!(clone.get().default_book, BookType::A);
    }

    #[test]
    fn simulation_validation() {
        let mut p = SimulationParams::default();
        assert!(p.validate().is_ok());
        p.slippage_max = 1.0;
        assert!(p.validate().is_err());
        let mut p = SimulationParams::default();
        p.fill_rate = 1.5;
        assert!(p.validate().is_err());
        let mut p = SimulationParams::default();
        p.delay_ms_min = 600;
        assert!(p.validate().is_err());
    }

    #[test]
    fn config_serializes_with_string_keys() {
        let mut cfg = BookRoutingConfig::default();
        let pool = PoolId::new();
        cfg.pool_overrides.insert(pool, BookType::A);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BookRoutingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
