//! aqc-runtime
//!
//! Trading cycle orchestration.
//!
//! - [`TradingDesk`] owns every pool's mutable state behind per-pool locks.
//!   Lock order is cycle -> ledger -> book -> risk; the sync locks are never
//!   held across an `.await`.
//! - [`TradingCycle`] runs one pass for one pool: prices, mark-to-market and
//!   triggered exits, decision, risk gate, sizing, execution, booking,
//!   journaling. Cycles are idempotent per batch id.
//! - [`CycleScheduler`] drives cycles on an interval, one task per pool, each
//!   with an explicit [`ScheduleHandle`].

mod cycle;
mod desk;
mod scheduler;

pub use cycle::{CycleError, CycleOutcome, CycleReport, CycleRunner, TradingCycle};
pub use desk::{DeskError, DeskParams, PoolRuntime, PoolSpec, PoolSummary, TradingDesk};
pub use scheduler::{CycleScheduler, ReportHook, ScheduleHandle};
