//! aqc-strategy
//!
//! Seam to the decision-generating collaborator.
//!
//! Contract:
//! - One call per pool per cycle: snapshot in, at most one proposal out.
//! - The collaborator never sees ledger or venue handles; it only gets the
//!   read-only [`MarketSnapshot`](aqc_schemas::MarketSnapshot).
//! - Every proposal is validated here before the orchestrator journals or
//!   acts on it.

mod source;
mod validate;

pub use source::{DecisionSource, SourceError};
pub use validate::{reference_price, validate_proposal, ProposalRejection};
