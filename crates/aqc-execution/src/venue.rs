use std::time::Duration;

use aqc_schemas::OrderSide;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::SimulationParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order as handed to a venue adapter or the fill simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrderRequest {
    /// Idempotency key on the venue side.
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price, or the reference price for market orders.
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl VenueOrderStatus {
    /// No further fills will arrive.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VenueOrderStatus::Filled
                | VenueOrderStatus::Cancelled
                | VenueOrderStatus::Rejected
                | VenueOrderStatus::Expired
        )
    }
}

/// Venue view of an order, returned on placement and on every status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrderAck {
    pub external_id: String,
    pub status: VenueOrderStatus,
    pub filled_qty: Decimal,
    /// Volume-weighted fill price; `None` until something filled.
    pub avg_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("venue rejected order: {0}")]
    Rejected(String),
    #[error("venue transport error: {0}")]
    Transport(String),
    #[error("unknown venue order {0}")]
    UnknownOrder(String),
}

/// Real exchange adapter used for A-Book orders.
///
/// The router bounds every call with its own deadline; adapters do not need
/// to implement timeouts.
#[async_trait]
pub trait LiveVenue: Send + Sync {
    async fn place_order(&self, req: &VenueOrderRequest) -> Result<VenueOrderAck, VenueError>;

    async fn order_status(
        &self,
        external_id: &str,
        symbol: &str,
    ) -> Result<VenueOrderAck, VenueError>;
}

#[async_trait]
impl<T: LiveVenue + ?Sized> LiveVenue for std::sync::Arc<T> {
    async fn place_order(&self, req: &VenueOrderRequest) -> Result<VenueOrderAck, VenueError> {
        (**self).place_order(req).await
    }

    async fn order_status(
        &self,
        external_id: &str,
        symbol: &str,
    ) -> Result<VenueOrderAck, VenueError> {
        (**self).order_status(external_id, symbol).await
    }
}

/// Outcome of one simulated B-Book fill.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedFill {
    pub delay: Duration,
    pub filled_qty: Decimal,
    pub fill_price: Decimal,
}

/// B-Book fill model. Pure: never performs I/O.
pub trait FillSimulator: Send + Sync {
    fn simulate(&self, req: &VenueOrderRequest, params: &SimulationParams) -> SimulatedFill;
}

/// Move `price` against the taker by `slippage` (a fraction).
///
/// Buys fill higher, sells fill lower.
pub fn apply_slippage(side: OrderSide, price: Decimal, slippage: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => price * (Decimal::ONE + slippage),
        OrderSide::Sell => price * (Decimal::ONE - slippage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn slippage_is_adverse() {
        assert_eq!(apply_slippage(OrderSide::Buy, dec!(100), dec!(0.001)), dec!(100.1));
        assert_eq!(apply_slippage(OrderSide::Sell, dec!(100), dec!(0.001)), dec!(99.9));
        assert_eq!(apply_slippage(OrderSide::Buy, dec!(100), Decimal::ZERO), dec!(100));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!VenueOrderStatus::New.is_terminal());
        assert!(!VenueOrderStatus::PartiallyFilled.is_terminal());
        assert!(VenueOrderStatus::Filled.is_terminal());
        assert!(VenueOrderStatus::Rejected.is_terminal());
    }
}
