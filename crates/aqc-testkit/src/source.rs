use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use aqc_schemas::{MarketSnapshot, ProposedDecision, TradeAction};
use aqc_strategy::{DecisionSource, SourceError};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Hands out queued answers, one per cycle. An empty queue means "nothing
/// to say" (`Ok(None)`).
#[derive(Default)]
pub struct ScriptedDecisionSource {
    queue: Mutex<VecDeque<Result<Option<ProposedDecision>, SourceError>>>,
    seen: Mutex<Vec<MarketSnapshot>>,
}

impl ScriptedDecisionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, proposal: ProposedDecision) {
        self.push_result(Ok(Some(proposal)));
    }

    pub fn push_none(&self) {
        self.push_result(Ok(None));
    }

    pub fn push_result(&self, answer: Result<Option<ProposedDecision>, SourceError>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(answer);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshots handed to the source, oldest first.
    pub fn snapshots(&self) -> Vec<MarketSnapshot> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisionSource {
    async fn propose_decision(
        &self,
        snapshot: &MarketSnapshot,
    ) -> Result<Option<ProposedDecision>, SourceError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

// ---------------------------------------------------------------------------
// Proposal builders
// ---------------------------------------------------------------------------

fn entry(action: TradeAction, symbol: &str, quantity: Decimal, leverage: Decimal) -> ProposedDecision {
    ProposedDecision {
        action,
        symbol: symbol.to_string(),
        quantity,
        suggested_price: None,
        stop_loss: None,
        take_profit: None,
        leverage,
        reasoning: format!("{action} {symbol}"),
        confidence_score: 0.7,
        risk_score: 0.3,
    }
}

/// Market long at the live mark. Set `stop_loss`/`take_profit` on the result as needed.
pub fn long(symbol: &str, quantity: Decimal, leverage: Decimal) -> ProposedDecision {
    entry(TradeAction::Long, symbol, quantity, leverage)
}

pub fn short(symbol: &str, quantity: Decimal, leverage: Decimal) -> ProposedDecision {
    entry(TradeAction::Short, symbol, quantity, leverage)
}

/// Flatten everything open in `symbol`.
pub fn close(symbol: &str) -> ProposedDecision {
    entry(TradeAction::Close, symbol, Decimal::ZERO, Decimal::ONE)
}
