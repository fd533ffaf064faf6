//! B-Book fill simulator.
//!
//! Model, per order:
//! - latency drawn uniformly from `[delay_ms_min, delay_ms_max]`
//! - slippage fraction drawn uniformly from `[slippage_min, slippage_max]`,
//!   always against the taker (buys higher, sells lower)
//! - complete fill with probability `fill_rate`; otherwise a fraction of the
//!   requested size drawn from `[partial_fill_min, partial_fill_max]`
//!
//! Quantities and prices are rounded to 8 dp; filled size rounds toward zero
//! so a partial fill never exceeds the request.
//!
//! `seeded` gives a reproducible sequence for tests and replays.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use aqc_execution::{apply_slippage, FillSimulator, SimulatedFill, SimulationParams, VenueOrderRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

const DP: u32 = 8;

#[derive(Debug)]
pub struct PaperFillSimulator {
    rng: Mutex<StdRng>,
}

impl PaperFillSimulator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Default for PaperFillSimulator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl FillSimulator for PaperFillSimulator {
    fn simulate(&self, req: &VenueOrderRequest, params: &SimulationParams) -> SimulatedFill {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        let delay_ms = rng.gen_range(params.delay_ms_min..=params.delay_ms_max);
        let slippage = rng.gen_range(params.slippage_min..=params.slippage_max);
        let complete = rng.gen_bool(params.fill_rate.clamp(0.0, 1.0));
        let fraction = if complete {
            1.0
        } else {
            rng.gen_range(params.partial_fill_min..=params.partial_fill_max)
        };

        let slippage = to_decimal(slippage);
        let filled_qty = if complete {
            req.quantity
        } else {
            (req.quantity * to_decimal(fraction))
                .round_dp_with_strategy(DP, RoundingStrategy::ToZero)
                .min(req.quantity)
        };

        SimulatedFill {
            delay: Duration::from_millis(delay_ms),
            filled_qty,
            fill_price: apply_slippage(req.side, req.price, slippage)
                .round_dp_with_strategy(DP, RoundingStrategy::MidpointNearestEven),
        }
    }
}

fn to_decimal(x: f64) -> Decimal {
    Decimal::from_f64(x)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(DP, RoundingStrategy::MidpointNearestEven)
}
