use aqc_schemas::{MarketSnapshot, ProposedDecision};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("decision source unavailable: {0}")]
    Unavailable(String),
    #[error("decision source returned malformed output: {0}")]
    Malformed(String),
}

/// Produces trading proposals for a pool.
///
/// `Ok(None)` means the collaborator had nothing to say this cycle; an
/// explicit hold is `Some(ProposedDecision::hold(..))` and gets journaled.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    async fn propose_decision(
        &self,
        snapshot: &MarketSnapshot,
    ) -> Result<Option<ProposedDecision>, SourceError>;
}

#[async_trait]
impl<T: DecisionSource + ?Sized> DecisionSource for std::sync::Arc<T> {
    async fn propose_decision(
        &self,
        snapshot: &MarketSnapshot,
    ) -> Result<Option<ProposedDecision>, SourceError> {
        (**self).propose_decision(snapshot).await
    }
}
