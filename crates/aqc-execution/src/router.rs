//! Book dispatch.
//!
//! `ExecutionRouter::execute` is the only entry point. The A-Book and B-Book
//! paths are separate private methods: the simulated path holds no reference
//! to the live venue, so a B-Book order cannot reach it.

use std::sync::Arc;
use std::time::Duration;

use aqc_journal::{Journal, JournalError};
use aqc_schemas::{
    BookType, Decision, DecisionId, OrderSide, PoolId, PositionSide, StrategyId, Trade, TradeId,
    TradeStatus,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    BookConfigStore, FillSimulator, LiveVenue, OrderType, VenueOrderAck, VenueOrderRequest,
    VenueOrderStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("invalid execution request: {0}")]
    InvalidRequest(String),
    /// The trade happened (or failed) but could not be journaled.
    #[error("journal write failed: {0}")]
    Journal(#[from] JournalError),
}

/// Bounds on live venue interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenuePolicy {
    /// Deadline for placement plus confirmation.
    pub timeout: Duration,
    /// Status polls after placement while the order is still working.
    pub confirm_attempts: u32,
    pub confirm_interval: Duration,
}

impl Default for VenuePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            confirm_attempts: 5,
            confirm_interval: Duration::from_millis(200),
        }
    }
}

/// One order to execute on behalf of a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub decision_id: DecisionId,
    pub pool_id: PoolId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Mark the order is sized and simulated against.
    pub reference_price: Decimal,
}

impl ExecutionRequest {
    /// Opening order for an entry decision; `None` for close/hold.
    pub fn entry(decision: &Decision, reference_price: Decimal) -> Option<Self> {
        let side = decision.action.entry_side()?;
        Some(Self {
            decision_id: decision.id,
            pool_id: decision.pool_id,
            symbol: decision.symbol.clone(),
            side: side.entry_side(),
            quantity: decision.suggested_amount,
            reference_price,
        })
    }

    /// Flattening order for `quantity` of a position with direction `position_side`.
    pub fn exit(
        decision: &Decision,
        position_side: PositionSide,
        quantity: Decimal,
        reference_price: Decimal,
    ) -> Self {
        Self {
            decision_id: decision.id,
            pool_id: decision.pool_id,
            symbol: decision.symbol.clone(),
            side: position_side.exit_side(),
            quantity,
            reference_price,
        }
    }

    fn validate(&self) -> Result<(), ExecutionError> {
        if self.symbol.trim().is_empty() {
            return Err(ExecutionError::InvalidRequest("empty symbol".into()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(ExecutionError::InvalidRequest(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.reference_price <= Decimal::ZERO {
            return Err(ExecutionError::InvalidRequest(format!(
                "reference price must be positive, got {}",
                self.reference_price
            )));
        }
        Ok(())
    }

    fn venue_order(&self, client_order_id: String) -> VenueOrderRequest {
        VenueOrderRequest {
            client_order_id,
            symbol: self.symbol.clone(),
            side: self.side,
            order_type: OrderType::Market,
            quantity: self.quantity,
            price: self.reference_price,
        }
    }
}

pub struct ExecutionRouter<L, S> {
    live: L,
    simulator: S,
    books: BookConfigStore,
    journal: Arc<Journal>,
    policy: VenuePolicy,
}

impl<L: LiveVenue, S: FillSimulator> ExecutionRouter<L, S> {
    pub fn new(
        live: L,
        simulator: S,
        books: BookConfigStore,
        journal: Arc<Journal>,
        policy: VenuePolicy,
    ) -> Self {
        Self {
            live,
            simulator,
            books,
            journal,
            policy,
        }
    }

    pub fn books(&self) -> &BookConfigStore {
        &self.books
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    /// Book for a pool/strategy under the current routing config.
    pub fn route(&self, pool_id: PoolId, strategy_id: &StrategyId) -> BookType {
        self.books.route(pool_id, strategy_id)
    }

    /// Execute on `book` and journal the resulting trade.
    ///
    /// Venue errors and timeouts are not errors here: they produce a trade
    /// with status `failed`. `Err` means the request was malformed (nothing
    /// was sent) or the trade could not be journaled.
    pub async fn execute(
        &self,
        req: &ExecutionRequest,
        book: BookType,
    ) -> Result<Trade, ExecutionError> {
        req.validate()?;

        let trade = match book {
            BookType::A => self.execute_live(req).await,
            BookType::B => self.execute_simulated(req).await,
        };

        self.journal.record_trade(&trade)?;

        info!(
            pool_id = %trade.pool_id,
            decision_id = %trade.decision_id,
            book = %trade.book_type,
            symbol = %trade.symbol,
            side = %trade.side,
            requested = %trade.quantity,
            filled = %trade.filled_qty,
            avg_price = %trade.avg_price,
            status = %trade.status,
            "trade executed"
        );
        Ok(trade)
    }

    // ------------------------------------------------------------------
    // A-Book
    // ------------------------------------------------------------------

    async fn execute_live(&self, req: &ExecutionRequest) -> Trade {
        let client_order_id = format!("aqc-{}", Uuid::new_v4().simple());
        let order = req.venue_order(client_order_id.clone());
        let deadline = Instant::now() + self.policy.timeout;

        let mut ack = match timeout_at(deadline, self.live.place_order(&order)).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => {
                warn!(symbol = %req.symbol, error = %e, "live venue placement failed");
                return failed_trade(req, BookType::A, client_order_id, None, e.to_string());
            }
            Err(_) => {
                warn!(symbol = %req.symbol, timeout_ms = self.policy.timeout.as_millis() as u64, "live venue placement timed out");
                return failed_trade(
                    req,
                    BookType::A,
                    client_order_id,
                    None,
                    "venue placement timed out".into(),
                );
            }
        };

        // Deferred confirmation: poll until terminal, attempts exhausted, or deadline.
        let mut attempts = 0;
        while !ack.status.is_terminal() && attempts < self.policy.confirm_attempts {
            attempts += 1;
            if timeout_at(deadline, sleep(self.policy.confirm_interval))
                .await
                .is_err()
            {
                break;
            }
            match timeout_at(
                deadline,
                self.live.order_status(&ack.external_id, &req.symbol),
            )
            .await
            {
                Ok(Ok(next)) => ack = next,
                Ok(Err(e)) => {
                    warn!(external_id = %ack.external_id, error = %e, "order status query failed");
                    break;
                }
                Err(_) => break,
            }
        }

        live_trade(req, client_order_id, ack)
    }

    // ------------------------------------------------------------------
    // B-Book
    // ------------------------------------------------------------------

    async fn execute_simulated(&self, req: &ExecutionRequest) -> Trade {
        let client_order_id = format!("sim-{}", Uuid::new_v4().simple());
        let order = req.venue_order(client_order_id.clone());
        let params = self.books.simulation();
        let fill = self.simulator.simulate(&order, &params);

        sleep(fill.delay).await;

        let filled = fill.filled_qty.min(req.quantity).max(Decimal::ZERO);
        let status = TradeStatus::from_fill(req.quantity, filled);
        Trade {
            id: TradeId::new(),
            decision_id: req.decision_id,
            pool_id: req.pool_id,
            book_type: BookType::B,
            order_id: client_order_id,
            external_id: None,
            symbol: req.symbol.clone(),
            side: req.side,
            quantity: req.quantity,
            filled_qty: filled,
            avg_price: if status.has_fill() {
                fill.fill_price
            } else {
                Decimal::ZERO
            },
            requested_price: req.reference_price,
            status,
            is_simulated: true,
            error: (!status.has_fill()).then(|| "simulated order not filled".to_string()),
            executed_at: Utc::now(),
        }
    }
}

fn live_trade(req: &ExecutionRequest, client_order_id: String, ack: VenueOrderAck) -> Trade {
    let filled = ack.filled_qty.min(req.quantity).max(Decimal::ZERO);
    if filled.is_zero() {
        let reason = match ack.status {
            VenueOrderStatus::Rejected => "venue rejected order".to_string(),
            VenueOrderStatus::Cancelled | VenueOrderStatus::Expired => {
                format!("order {} without fill", venue_status_text(ack.status))
            }
            _ => "order unconfirmed before deadline".to_string(),
        };
        return failed_trade(
            req,
            BookType::A,
            client_order_id,
            Some(ack.external_id),
            reason,
        );
    }

    let avg_price = match ack.avg_price {
        Some(p) if p > Decimal::ZERO => p,
        _ => {
            warn!(external_id = %ack.external_id, "fill reported without price; using reference price");
            req.reference_price
        }
    };

    Trade {
        id: TradeId::new(),
        decision_id: req.decision_id,
        pool_id: req.pool_id,
        book_type: BookType::A,
        order_id: client_order_id,
        external_id: Some(ack.external_id),
        symbol: req.symbol.clone(),
        side: req.side,
        quantity: req.quantity,
        filled_qty: filled,
        avg_price,
        requested_price: req.reference_price,
        status: TradeStatus::from_fill(req.quantity, filled),
        is_simulated: false,
        error: None,
        executed_at: Utc::now(),
    }
}

fn failed_trade(
    req: &ExecutionRequest,
    book: BookType,
    order_id: String,
    external_id: Option<String>,
    error: String,
) -> Trade {
    Trade {
        id: TradeId::new(),
        decision_id: req.decision_id,
        pool_id: req.pool_id,
        book_type: book,
        order_id,
        external_id,
        symbol: req.symbol.clone(),
        side: req.side,
        quantity: req.quantity,
        filled_qty: Decimal::ZERO,
        avg_price: Decimal::ZERO,
        requested_price: req.reference_price,
        status: TradeStatus::Failed,
        is_simulated: book == BookType::B,
        error: Some(error),
        executed_at: Utc::now(),
    }
}

fn venue_status_text(s: VenueOrderStatus) -> &'static str {
    match s {
        VenueOrderStatus::New => "new",
        VenueOrderStatus::PartiallyFilled => "partially filled",
        VenueOrderStatus::Filled => "filled",
        VenueOrderStatus::Cancelled => "cancelled",
        VenueOrderStatus::Rejected => "rejected",
        VenueOrderStatus::Expired => "expired",
    }
}
