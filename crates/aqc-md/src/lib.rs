//! aqc-md
//!
//! Price feed boundary. The core consumes already-formed marks; transport to
//! an exchange or aggregator lives behind [`PriceFeed`].

pub mod feed;
pub mod quality;

pub use feed::{FeedError, PriceFeed, StaticPriceFeed};
pub use quality::{validate_prices, PriceCheck, PriceIssue, RejectedPrice};
