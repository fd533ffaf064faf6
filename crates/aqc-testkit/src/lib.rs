//! aqc-testkit
//!
//! In-process fakes and a wired desk for end-to-end scenarios under `tests/`.
//! Nothing here touches a network or a database.

mod harness;
mod source;
mod venue;

pub use harness::{tick, Harness, HarnessCycle};
pub use source::{close, long, short, ScriptedDecisionSource};
pub use venue::FakeLiveVenue;
