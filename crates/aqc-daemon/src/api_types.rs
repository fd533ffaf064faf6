//! Request and response types for the aqc-daemon HTTP endpoints.
//!
//! No business logic lives here.

use aqc_portfolio::{InvestmentOrder, OrderShare, OrderStatus, Pool, Position};
use aqc_risk::RiskSnapshot;
use aqc_schemas::{OrderId, PoolId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health  /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub pools: usize,
    pub frozen_pools: Vec<PoolId>,
    pub journal_records: u64,
    pub journal_head: Option<String>,
    pub config_hash: Option<String>,
    /// Whether `POST /v1/pools/:id/cycles` is wired.
    pub cycles_enabled: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Pools and investor orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub user_id: UserId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub order: InvestmentOrder,
    pub share: OrderShare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Pool state plus its open positions.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStateResponse {
    pub pool: Pool,
    pub open_positions: Vec<Position>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatusResponse {
    pub pool_id: PoolId,
    pub snapshot: RiskSnapshot,
}
