use aqc_schemas::{OrderId, PoolId, StrategyId, UserId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::OrderStatus;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Per-pool ledger policy (`ledger:` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerParams {
    /// Smallest accepted subscription amount.
    pub min_subscription: Decimal,
    /// Percent of principal withheld when redeeming before the lock period ends.
    pub early_redemption_penalty_pct: Decimal,
    pub lock_period_days: i64,
    /// NAV per share of a fresh pool.
    pub initial_nav_per_share: Decimal,
    /// Absolute tolerance for the NAV reconciliation check.
    pub reconcile_tolerance: Decimal,
    pub currency: String,
}

impl LedgerParams {
    pub fn lock_period(&self) -> Duration {
        Duration::days(self.lock_period_days)
    }
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            min_subscription: Decimal::from(100),
            early_redemption_penalty_pct: Decimal::from(2),
            lock_period_days: 30,
            initial_nav_per_share: Decimal::ONE,
            reconcile_tolerance: Decimal::new(1, 2),
            currency: "USDT".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    /// No subscriptions, trades or redemptions until reconciled.
    Frozen,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "frozen" => Some(Self::Frozen),
            _ => None,
        }
    }
}

/// Shared capital vehicle backing one strategy.
///
/// `total_capital` is contributed principal net of redemptions;
/// `realized_pnl` accumulates settled trading results separately so NAV
/// per share is `(total_capital + realized_pnl + unrealized_pnl) / shares`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub strategy_id: StrategyId,
    pub status: PoolStatus,
    pub frozen_reason: Option<String>,
    pub total_capital: Decimal,
    pub available_capital: Decimal,
    pub locked_capital: Decimal,
    pub current_nav_per_share: Decimal,
    pub total_shares_outstanding: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    /// Percent of settled trades with positive P&L.
    pub win_rate: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pool {
    /// Mark-to-market value backing the outstanding shares.
    pub fn value(&self) -> Decimal {
        self.total_capital + self.realized_pnl + self.unrealized_pnl
    }

    pub fn is_frozen(&self) -> bool {
        self.status == PoolStatus::Frozen
    }
}

// ---------------------------------------------------------------------------
// Orders and shares
// ---------------------------------------------------------------------------

/// One investor subscription into a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub pool_id: PoolId,
    pub invested_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub lock_period_end: DateTime<Utc>,
    /// Net payout minus principal; set when the order exits.
    pub realized_profit: Decimal,
    pub total_fees_paid: Decimal,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Ownership record linking an order to pool shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShare {
    pub order_id: OrderId,
    pub pool_id: PoolId,
    pub shares_owned: Decimal,
    pub avg_entry_nav: Decimal,
    /// Percent of pool shares held by this order.
    pub share_percentage: Decimal,
    pub total_invested: Decimal,
}
