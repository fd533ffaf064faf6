//! aqc-portfolio
//!
//! Pool Ledger and Position Book.
//! - Share/NAV accounting for one investment pool per strategy
//! - Investor orders with an explicit lifecycle state machine
//! - Leveraged positions marked to market, with stop/take/liquidation triggers
//! - Pool invariants checked on every mutation; a violation freezes the pool
//! - Pure deterministic logic (no IO, no wall clock, no locking). Callers pass
//!   `now` explicitly and own the per-pool serialization.

mod order_status;
mod types;

pub mod ledger;
pub mod positions;

pub use ledger::{InvariantBreach, LedgerError, PoolLedger, Redemption};
pub use order_status::{OrderStatus, OrderTransitionError};
pub use positions::{
    MarkReport, Position, PositionBook, PositionClose, PositionError, PositionLimits, SizingVerdict,
    Trigger,
};
pub use types::{InvestmentOrder, LedgerParams, OrderShare, Pool, PoolStatus};

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for shares and NAV per share.
pub const SHARE_SCALE: u32 = 8;

/// Round to share precision, toward zero. Used for share issuance so the pool
/// never issues more value than it received.
pub fn floor_shares(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(SHARE_SCALE, RoundingStrategy::ToZero)
}

/// Round to share precision, half-even. Used for NAV and derived ratios.
pub fn round_scaled(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(SHARE_SCALE, RoundingStrategy::MidpointNearestEven)
}
