use aqc_schemas::{Decision, DecisionId, PoolId, PositionId, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum JournalEntry {
    Decision(Decision),
    Trade(Trade),
    /// Decision acted on: back-fills `was_executed` / `execution_price`.
    Execution {
        decision_id: DecisionId,
        execution_price: Decimal,
        executed_at: DateTime<Utc>,
    },
    /// Position of the decision closed: back-fills the outcome fields.
    Outcome {
        decision_id: DecisionId,
        pnl: Decimal,
        was_successful: bool,
        outcome_at: DateTime<Utc>,
    },
    /// P&L booked by one close, partial or final, on the day it happened.
    Realization(Realization),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realization {
    pub pool_id: PoolId,
    pub position_id: PositionId,
    /// Opening decision of the position, when it has one.
    pub decision_id: Option<DecisionId>,
    pub quantity: Decimal,
    pub pnl: Decimal,
    pub realized_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decision(_) => "decision",
            Self::Trade(_) => "trade",
            Self::Execution { .. } => "execution",
            Self::Outcome { .. } => "outcome",
            Self::Realization(_) => "realization",
        }
    }
}

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub entry: JournalEntry,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
pub(crate) fn canonical_json_line<T: Serialize>(v: &T) -> Result<String, serde_json::Error> {
    let raw = serde_json::to_value(v)?;
    serde_json::to_string(&sort_keys(&raw))
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash over the canonical JSON of the record WITHOUT `hash_self`.
pub fn compute_record_hash(rec: &JournalRecord) -> Result<String, serde_json::Error> {
    let mut clone = rec.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
