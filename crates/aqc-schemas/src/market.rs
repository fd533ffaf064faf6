use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{PoolId, PositionId, PositionSide};

/// symbol -> last price
pub type PriceMap = BTreeMap<String, Decimal>;

/// Read-only view of an open position handed to the strategy collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPositionView {
    pub position_id: PositionId,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Input to `proposeDecision`: what the pool looks like this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub pool_id: PoolId,
    pub as_of: DateTime<Utc>,
    pub prices: PriceMap,
    pub available_capital: Decimal,
    pub open_positions: Vec<OpenPositionView>,
}

impl MarketSnapshot {
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }
}
