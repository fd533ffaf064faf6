//! Shared entities of the trading core.
//!
//! Everything that crosses a crate boundary (ids, sides, book tags, decisions,
//! trades, market snapshots) lives here so the ledger, risk, execution and
//! journal crates agree on one compile-time-checked shape. Persistence maps
//! these types column by column; nothing passes through an untyped row.

mod decision;
mod ids;
mod kinds;
mod market;
mod trade;

pub use decision::{Decision, ProposedDecision};
pub use ids::{BatchId, DecisionId, OrderId, PoolId, PositionId, StrategyId, TradeId, UserId};
pub use kinds::{
    BookType, CloseReason, DecisionType, OrderSide, ParseKindError, PositionSide, TradeAction,
    TradeStatus,
};
pub use market::{MarketSnapshot, OpenPositionView, PriceMap};
pub use trade::Trade;
