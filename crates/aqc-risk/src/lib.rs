//! aqc-risk
//!
//! Pre-trade risk gate per pool and UTC day.
//! - Named risk profiles (daily loss/profit bounds, exposure, position size, leverage)
//! - Daily snapshot recomputed from ledger, open positions and today's settlements
//! - One-way gate: once closed for a pool/day it stays closed until the date changes
//! - Limits are verdicts, never errors; only an unknown pool or profile fails
//!
//! Deterministic, pure logic. Callers pass `now` and own the per-pool lock.

mod engine;
mod types;

pub use engine::{compute_snapshot, DailyRiskBook, RiskInputSource, RiskManager};
pub use types::*;
