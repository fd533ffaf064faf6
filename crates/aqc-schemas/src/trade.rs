use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BookType, DecisionId, OrderSide, PoolId, TradeId, TradeStatus};

/// Execution record of one attempt to act on a decision. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub decision_id: DecisionId,
    pub pool_id: PoolId,
    pub book_type: BookType,
    /// Venue order id (client-side id for the simulator).
    pub order_id: String,
    /// Venue-assigned id, when the venue returned one.
    pub external_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub filled_qty: Decimal,
    pub avg_price: Decimal,
    pub requested_price: Decimal,
    pub status: TradeStatus,
    pub is_simulated: bool,
    /// Venue error or timeout text for failed attempts.
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Filled notional at the achieved price.
    pub fn filled_notional(&self) -> Decimal {
        self.filled_qty * self.avg_price
    }

    pub fn is_executed(&self) -> bool {
        self.status.has_fill()
    }
}
