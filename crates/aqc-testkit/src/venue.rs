use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use aqc_execution::{LiveVenue, VenueError, VenueOrderAck, VenueOrderRequest, VenueOrderStatus};
use async_trait::async_trait;

type Answer = Result<VenueOrderAck, VenueError>;

/// Scriptable A-Book venue.
///
/// Queued placement and status answers are consumed in order. With an empty
/// placement queue an order fills completely at its reference price. Every
/// placement request is recorded.
#[derive(Default)]
pub struct FakeLiveVenue {
    placements: Mutex<VecDeque<Answer>>,
    statuses: Mutex<VecDeque<Answer>>,
    placed: Mutex<Vec<VenueOrderRequest>>,
    status_queries: Mutex<Vec<String>>,
}

impl FakeLiveVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_placement(&self, answer: Answer) {
        self.placements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(answer);
    }

    pub fn push_status(&self, answer: Answer) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(answer);
    }

    pub fn placed(&self) -> Vec<VenueOrderRequest> {
        self.placed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// External ids that were polled, in order.
    pub fn status_queries(&self) -> Vec<String> {
        self.status_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn filled(external_id: String, req: &VenueOrderRequest) -> VenueOrderAck {
    VenueOrderAck {
        external_id,
        status: VenueOrderStatus::Filled,
        filled_qty: req.quantity,
        avg_price: Some(req.price),
    }
}

#[async_trait]
impl LiveVenue for FakeLiveVenue {
    async fn place_order(&self, req: &VenueOrderRequest) -> Result<VenueOrderAck, VenueError> {
        let n = {
            let mut placed = self.placed.lock().unwrap_or_else(PoisonError::into_inner);
            placed.push(req.clone());
            placed.len()
        };
        let queued = self
            .placements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        queued.unwrap_or_else(|| Ok(filled(format!("fake-{n}"), req)))
    }

    async fn order_status(
        &self,
        external_id: &str,
        _symbol: &str,
    ) -> Result<VenueOrderAck, VenueError> {
        self.status_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(external_id.to_string());
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(VenueError::UnknownOrder(external_id.to_string())))
    }
}
