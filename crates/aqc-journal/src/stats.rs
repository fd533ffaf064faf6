use std::collections::{BTreeMap, BTreeSet};

use aqc_schemas::{BookType, Decision, DecisionId, PoolId, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsFilter {
    pub pool_id: Option<PoolId>,
    /// Only decisions with at least one trade on this book.
    pub book: Option<BookType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeFilter {
    pub pool_id: Option<PoolId>,
    pub book: Option<BookType>,
    pub symbol: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookStats {
    /// Filled notional.
    pub volume: Decimal,
    pub trade_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalStats {
    pub total_decisions: u64,
    /// Trade records (execution attempts), failed ones included.
    pub total_trades: u64,
    pub executed: u64,
    pub successful: u64,
    pub avg_confidence: f64,
    pub total_pnl: Decimal,
    pub per_book: BTreeMap<BookType, BookStats>,
}

impl JournalStats {
    pub fn per_book_volume(&self, book: BookType) -> Decimal {
        self.per_book.get(&book).map(|b| b.volume).unwrap_or_default()
    }

    pub fn per_book_trade_count(&self, book: BookType) -> u64 {
        self.per_book.get(&book).map(|b| b.trade_count).unwrap_or(0)
    }
}

fn in_window(ts: DateTime<Utc>, f: &StatsFilter) -> bool {
    f.since.map_or(true, |s| ts >= s) && f.until.map_or(true, |u| ts < u)
}

pub(crate) fn aggregate<'a>(
    decisions: impl Iterator<Item = &'a Decision>,
    trades: &[Trade],
    f: &StatsFilter,
) -> JournalStats {
    let trades: Vec<&Trade> = trades
        .iter()
        .filter(|t| f.pool_id.map_or(true, |p| t.pool_id == p))
        .filter(|t| f.book.map_or(true, |b| t.book_type == b))
        .filter(|t| in_window(t.executed_at, f))
        .collect();
    let booked: BTreeSet<DecisionId> = trades.iter().map(|t| t.decision_id).collect();

    let mut stats = JournalStats::default();
    let mut confidence_sum = 0.0_f64;
    for d in decisions
        .filter(|d| f.pool_id.map_or(true, |p| d.pool_id == p))
        .filter(|d| f.book.is_none() || booked.contains(&d.id))
        .filter(|d| in_window(d.created_at, f))
    {
        stats.total_decisions += 1;
        confidence_sum += d.confidence_score;
        if d.was_executed {
            stats.executed += 1;
        }
        if d.was_successful == Some(true) {
            stats.successful += 1;
        }
        stats.total_pnl += d.outcome_pnl.unwrap_or_default();
    }
    if stats.total_decisions > 0 {
        stats.avg_confidence = confidence_sum / stats.total_decisions as f64;
    }

    for t in trades {
        stats.total_trades += 1;
        let b = stats.per_book.entry(t.book_type).or_default();
        b.trade_count += 1;
        b.volume += t.filled_notional();
    }
    stats
}

pub(crate) fn select_trades(trades: &[Trade], f: &TradeFilter) -> Vec<Trade> {
    let iter = trades
        .iter()
        .rev()
        .filter(|t| f.pool_id.map_or(true, |p| t.pool_id == p))
        .filter(|t| f.book.map_or(true, |b| t.book_type == b))
        .filter(|t| f.symbol.as_deref().map_or(true, |s| t.symbol == s))
        .cloned();
    match f.limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}
