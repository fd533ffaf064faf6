//! aqc-journal
//!
//! Append-only record of every decision, every execution attempt, every
//! realized close and every outcome. Each record is written to a durable sink before the in-memory
//! index changes, so a sink failure leaves the journal exactly as it was and
//! the caller aborts the cycle.
//!
//! The JSON Lines sink writes one canonical (sorted-key) JSON record per line
//! with an optional SHA-256 hash chain (`hash_prev` / `hash_self`);
//! [`verify_hash_chain`] detects edits and [`Journal::replay`] rebuilds the
//! index after a restart.

mod entry;
mod journal;
mod sink;
mod stats;
mod verify;

pub use entry::{compute_record_hash, JournalEntry, JournalRecord, Realization};
pub use journal::{DailyActivity, Journal, JournalError};
pub use sink::{JournalSink, JsonlSink, MemorySink};
pub use stats::{BookStats, JournalStats, StatsFilter, TradeFilter};
pub use verify::{verify_hash_chain, verify_hash_chain_str, VerifyResult};
