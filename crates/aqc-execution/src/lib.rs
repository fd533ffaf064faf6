//! aqc-execution
//!
//! A-Book / B-Book execution router.
//! - Book selection: pool override, then strategy override, then default
//! - Runtime-adjustable routing through an injected [`BookConfigStore`]
//! - A-Book goes to a [`LiveVenue`] under a bounded timeout with deferred
//!   status confirmation; venue errors become failed trades
//! - B-Book goes to a [`FillSimulator`] and never touches the live venue
//! - Every trade is journaled before it is returned

mod book_config;
mod router;
mod venue;

pub use book_config::{BookConfigError, BookConfigStore, BookRoutingConfig, SimulationParams};
pub use router::{ExecutionError, ExecutionRequest, ExecutionRouter, VenuePolicy};
pub use venue::{
    apply_slippage, FillSimulator, LiveVenue, OrderType, SimulatedFill, VenueError, VenueOrderAck,
    VenueOrderRequest, VenueOrderStatus,
};
