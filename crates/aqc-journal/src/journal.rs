use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use aqc_schemas::{BatchId, Decision, DecisionId, PoolId, Trade, TradeId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::canonical_json_line;
use crate::stats::{aggregate, select_trades};
use crate::{
    compute_record_hash, verify_hash_chain_str, JournalEntry, JournalRecord, JournalSink,
    JournalStats, JsonlSink, Realization, StatsFilter, TradeFilter, VerifyResult,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal encoding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("journal sink: {0}")]
    Sink(String),
    #[error("corrupt journal at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("decision {0} already recorded")]
    DuplicateDecision(DecisionId),
    #[error("trade {0} already recorded")]
    DuplicateTrade(TradeId),
    #[error("unknown decision {0}")]
    UnknownDecision(DecisionId),
    #[error("decision {0} already executed at a different price")]
    ExecutionConflict(DecisionId),
    #[error("decision {0} already has a different outcome")]
    OutcomeConflict(DecisionId),
}

/// Today's settled activity of one pool, as seen by the journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    /// Sum of every close realized that day, partial closes included.
    pub realized_pnl: Decimal,
    pub executed_decisions: u32,
    pub trades: u32,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct State {
    sink: Box<dyn JournalSink>,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
    decisions: HashMap<DecisionId, Decision>,
    decision_order: Vec<DecisionId>,
    trades: Vec<Trade>,
    trade_ids: HashSet<TradeId>,
    realizations: Vec<Realization>,
    batches: HashSet<(PoolId, BatchId)>,
}

/// Whether an entry changes anything.
enum Check {
    Apply,
    NoOp,
}

impl State {
    fn new(sink: Box<dyn JournalSink>, hash_chain: bool) -> Self {
        Self {
            sink,
            hash_chain,
            last_hash: None,
            seq: 0,
            decisions: HashMap::new(),
            decision_order: Vec::new(),
            trades: Vec::new(),
            trade_ids: HashSet::new(),
            realizations: Vec::new(),
            batches: HashSet::new(),
        }
    }

    fn check(&self, entry: &JournalEntry) -> Result<Check, JournalError> {
        match entry {
            JournalEntry::Decision(d) => {
                if self.decisions.contains_key(&d.id) {
                    return Err(JournalError::DuplicateDecision(d.id));
                }
            }
            JournalEntry::Trade(t) => {
                if !self.decisions.contains_key(&t.decision_id) {
                    return Err(JournalError::UnknownDecision(t.decision_id));
                }
                if self.trade_ids.contains(&t.id) {
                    return Err(JournalError::DuplicateTrade(t.id));
                }
            }
            JournalEntry::Execution {
                decision_id,
                execution_price,
                ..
            } => {
                let d = self
                    .decisions
                    .get(decision_id)
                    .ok_or(JournalError::UnknownDecision(*decision_id))?;
                if d.was_executed {
                    if d.execution_price == Some(*execution_price) {
                        return Ok(Check::NoOp);
                    }
                    return Err(JournalError::ExecutionConflict(*decision_id));
                }
            }
            JournalEntry::Outcome {
                decision_id,
                pnl,
                was_successful,
                ..
            } => {
                let d = self
                    .decisions
                    .get(decision_id)
                    .ok_or(JournalError::UnknownDecision(*decision_id))?;
                if let Some(existing) = d.outcome_pnl {
                    if existing == *pnl && d.was_successful == Some(*was_successful) {
                        return Ok(Check::NoOp);
                    }
                    return Err(JournalError::OutcomeConflict(*decision_id));
                }
            }
            JournalEntry::Realization(r) => {
                if let Some(id) = r.decision_id {
                    if !self.decisions.contains_key(&id) {
                        return Err(JournalError::UnknownDecision(id));
                    }
                }
            }
        }
        Ok(Check::Apply)
    }

    /// Write-ahead: the line reaches the sink before chain state or index move.
    fn append(&mut self, entry: JournalEntry) -> Result<JournalRecord, JournalError> {
        let mut rec = JournalRecord {
            seq: self.seq,
            ts_utc: Utc::now(),
            entry,
            hash_prev: None,
            hash_self: None,
        };
        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            rec.hash_self = Some(compute_record_hash(&rec)?);
        }
        let line = canonical_json_line(&rec)?;
        self.sink.append(&line)?;

        self.seq += 1;
        if self.hash_chain {
            self.last_hash = rec.hash_self.clone();
        }
        self.apply(&rec.entry);
        debug!(seq = rec.seq, kind = rec.entry.kind(), "journal append");
        Ok(rec)
    }

    fn apply(&mut self, entry: &JournalEntry) {
        match entry {
            JournalEntry::Decision(d) => {
                self.batches.insert((d.pool_id, d.batch_id.clone()));
                self.decision_order.push(d.id);
                self.decisions.insert(d.id, d.clone());
            }
            JournalEntry::Trade(t) => {
                self.trade_ids.insert(t.id);
                self.trades.push(t.clone());
            }
            JournalEntry::Execution {
                decision_id,
                execution_price,
                executed_at,
            } => {
                if let Some(d) = self.decisions.get_mut(decision_id) {
                    d.was_executed = true;
                    d.execution_price = Some(*execution_price);
                    d.executed_at = Some(*executed_at);
                }
            }
            JournalEntry::Outcome {
                decision_id,
                pnl,
                was_successful,
                outcome_at,
            } => {
                if let Some(d) = self.decisions.get_mut(decision_id) {
                    d.outcome_pnl = Some(*pnl);
                    d.was_successful = Some(*was_successful);
                    d.outcome_at = Some(*outcome_at);
                }
            }
            JournalEntry::Realization(r) => self.realizations.push(r.clone()),
        }
    }

    fn record(&mut self, entry: JournalEntry) -> Result<bool, JournalError> {
        match self.check(&entry) {
            Ok(Check::Apply) => {
                self.append(entry)?;
                Ok(true)
            }
            Ok(Check::NoOp) => Ok(false),
            Err(e) => {
                warn!(kind = entry.kind(), error = %e, "journal entry rejected");
                Err(e)
            }
        }
    }

    fn ordered_decisions(&self) -> impl Iterator<Item = &Decision> {
        self.decision_order.iter().filter_map(|id| self.decisions.get(id))
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Thread-safe journal handle. Share it behind an `Arc`.
pub struct Journal {
    state: Mutex<State>,
}

impl Journal {
    pub fn new(sink: impl JournalSink + 'static, hash_chain: bool) -> Self {
        Self {
            state: Mutex::new(State::new(Box::new(sink), hash_chain)),
        }
    }

    /// Rebuild from an existing JSONL file (if any) and keep appending to it.
    /// A broken hash chain refuses to load.
    pub fn replay(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self, JournalError> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let sink = JsonlSink::open(path)?;
        Self::replay_str(&content, sink, hash_chain)
    }

    /// Rebuild from JSONL content and append further records to `sink`.
    pub fn replay_str(
        content: &str,
        sink: impl JournalSink + 'static,
        hash_chain: bool,
    ) -> Result<Self, JournalError> {
        if hash_chain {
            if let VerifyResult::Broken { line, reason } = verify_hash_chain_str(content)? {
                return Err(JournalError::Corrupt { line, reason });
            }
        }
        let mut state = State::new(Box::new(sink), hash_chain);
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let rec: JournalRecord =
                serde_json::from_str(trimmed).map_err(|e| JournalError::Corrupt {
                    line: i + 1,
                    reason: e.to_string(),
                })?;
            if let Err(e) = state.check(&rec.entry) {
                return Err(JournalError::Corrupt {
                    line: i + 1,
                    reason: e.to_string(),
                });
            }
            state.apply(&rec.entry);
            state.seq = rec.seq + 1;
            state.last_hash = rec.hash_self.clone();
        }
        debug!(records = state.seq, "journal replayed");
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- writes -------------------------------------------------------------

    /// Append a decision. Must succeed before anything is executed for it.
    pub fn record_decision(&self, decision: &Decision) -> Result<(), JournalError> {
        self.lock()
            .record(JournalEntry::Decision(decision.clone()))
            .map(|_| ())
    }

    /// Append an execution attempt linked to a recorded decision.
    pub fn record_trade(&self, trade: &Trade) -> Result<(), JournalError> {
        self.lock().record(JournalEntry::Trade(trade.clone())).map(|_| ())
    }

    /// Mark a decision executed at `execution_price`. Re-applying the same
    /// price is a no-op.
    pub fn record_execution(
        &self,
        decision_id: DecisionId,
        execution_price: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<(), JournalError> {
        self.lock()
            .record(JournalEntry::Execution {
                decision_id,
                execution_price,
                executed_at,
            })
            .map(|_| ())
    }

    /// Back-fill the outcome of a decision whose position closed. Returns
    /// `false` when the identical outcome was already recorded.
    pub fn record_outcome(
        &self,
        decision_id: DecisionId,
        pnl: Decimal,
        was_successful: bool,
        outcome_at: DateTime<Utc>,
    ) -> Result<bool, JournalError> {
        self.lock().record(JournalEntry::Outcome {
            decision_id,
            pnl,
            was_successful,
            outcome_at,
        })
    }

    /// Append the P&L of one position close.
    pub fn record_realization(&self, realization: &Realization) -> Result<(), JournalError> {
        self.lock()
            .record(JournalEntry::Realization(realization.clone()))
            .map(|_| ())
    }

    // -- reads --------------------------------------------------------------

    pub fn decision(&self, id: DecisionId) -> Option<Decision> {
        self.lock().decisions.get(&id).cloned()
    }

    pub fn trades_for_decision(&self, id: DecisionId) -> Vec<Trade> {
        self.lock()
            .trades
            .iter()
            .filter(|t| t.decision_id == id)
            .cloned()
            .collect()
    }

    /// Decisions of one pool in journal order, newest last.
    pub fn decisions_for_pool(&self, pool_id: PoolId) -> Vec<Decision> {
        self.lock()
            .ordered_decisions()
            .filter(|d| d.pool_id == pool_id)
            .cloned()
            .collect()
    }

    pub fn has_batch(&self, pool_id: PoolId, batch_id: &BatchId) -> bool {
        self.lock().batches.contains(&(pool_id, batch_id.clone()))
    }

    pub fn statistics(&self, filter: &StatsFilter) -> JournalStats {
        let st = self.lock();
        aggregate(st.ordered_decisions(), &st.trades, filter)
    }

    /// Newest first.
    pub fn trade_history(&self, filter: &TradeFilter) -> Vec<Trade> {
        select_trades(&self.lock().trades, filter)
    }

    /// Realized P&L and executed count for one pool on one UTC day. Each
    /// close counts on its own day, so a position closed in pieces across
    /// midnight splits its P&L accordingly.
    pub fn daily_activity(&self, pool_id: PoolId, day: NaiveDate) -> DailyActivity {
        let st = self.lock();
        let mut out = DailyActivity {
            realized_pnl: st
                .realizations
                .iter()
                .filter(|r| r.pool_id == pool_id && r.realized_at.date_naive() == day)
                .map(|r| r.pnl)
                .sum(),
            ..DailyActivity::default()
        };
        for d in st.decisions.values().filter(|d| d.pool_id == pool_id) {
            if d.executed_at.map(|t| t.date_naive()) == Some(day) {
                out.executed_decisions += 1;
            }
        }
        out.trades = st
            .trades
            .iter()
            .filter(|t| t.pool_id == pool_id && t.executed_at.date_naive() == day)
            .count() as u32;
        out
    }

    pub fn len(&self) -> u64 {
        self.lock().seq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_hash(&self) -> Option<String> {
        self.lock().last_hash.clone()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
