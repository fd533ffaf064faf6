use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, DecisionId, DecisionType, PoolId, TradeAction};

/// Raw proposal from the strategy collaborator, before it is journaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedDecision {
    pub action: TradeAction,
    pub symbol: String,
    /// Base-asset quantity.
    pub quantity: Decimal,
    /// Reference price the strategy sized against; the live mark is used when absent.
    pub suggested_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Decimal,
    pub reasoning: String,
    /// 0..=1
    pub confidence_score: f64,
    /// 0..=1
    pub risk_score: f64,
}

impl ProposedDecision {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Hold,
            symbol: String::new(),
            quantity: Decimal::ZERO,
            suggested_price: None,
            stop_loss: None,
            take_profit: None,
            leverage: Decimal::ONE,
            reasoning: reasoning.into(),
            confidence_score: 0.0,
            risk_score: 0.0,
        }
    }
}

/// A journaled proposal.
///
/// Immutable once written except for the execution and outcome fields, which
/// the journal back-fills when the trade executes and when its position closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub pool_id: PoolId,
    pub batch_id: BatchId,
    pub decision_type: DecisionType,
    pub action: TradeAction,
    pub symbol: String,
    pub suggested_amount: Decimal,
    pub suggested_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Decimal,
    pub reasoning: String,
    pub confidence_score: f64,
    pub risk_score: f64,
    pub created_at: DateTime<Utc>,

    pub was_executed: bool,
    pub execution_price: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,

    pub outcome_pnl: Option<Decimal>,
    pub was_successful: Option<bool>,
    pub outcome_at: Option<DateTime<Utc>>,
}

impl Decision {
    pub fn from_proposal(
        pool_id: PoolId,
        batch_id: BatchId,
        proposal: &ProposedDecision,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DecisionId::new(),
            pool_id,
            batch_id,
            decision_type: proposal.action.decision_type(),
            action: proposal.action,
            symbol: proposal.symbol.clone(),
            suggested_amount: proposal.quantity,
            suggested_price: proposal.suggested_price,
            stop_loss: proposal.stop_loss,
            take_profit: proposal.take_profit,
            leverage: proposal.leverage,
            reasoning: proposal.reasoning.clone(),
            confidence_score: proposal.confidence_score,
            risk_score: proposal.risk_score,
            created_at,
            was_executed: false,
            execution_price: None,
            executed_at: None,
            outcome_pnl: None,
            was_successful: None,
            outcome_at: None,
        }
    }

    pub fn has_outcome(&self) -> bool {
        self.outcome_pnl.is_some()
    }
}
