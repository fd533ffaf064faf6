//! Axum router and all HTTP handlers for aqc-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can drive the bare router.

use std::{convert::Infallible, sync::Arc};

use aqc_execution::BookRoutingConfig;
use aqc_journal::{StatsFilter, TradeFilter};
use aqc_portfolio::LedgerError;
use aqc_runtime::{CycleError, DeskError, PoolRuntime, PoolSummary};
use aqc_schemas::{OrderId, PoolId};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, OrderStatusResponse, PoolStateResponse, RiskStatusResponse,
        StatusResponse, SubscriptionRequest, SubscriptionResponse, TopUpRequest,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/book/config", get(book_config_get).put(book_config_put))
        .route("/v1/statistics", get(statistics))
        .route("/v1/trades", get(trades))
        .route("/v1/pools", get(pools))
        .route("/v1/pools/:pool_id", get(pool_state))
        .route("/v1/pools/:pool_id/risk", get(pool_risk))
        .route("/v1/pools/:pool_id/decisions", get(pool_decisions))
        .route("/v1/pools/:pool_id/subscriptions", post(subscribe))
        .route("/v1/pools/:pool_id/reconcile", post(reconcile))
        .route("/v1/pools/:pool_id/cycles", post(trigger_cycle))
        .route("/v1/orders/:order_id/top-up", post(top_up))
        .route("/v1/orders/:order_id/redeem", post(redeem))
        .route("/v1/orders/:order_id/liquidate", post(liquidate))
        .route("/v1/orders/:order_id/pause", post(pause_order))
        .route("/v1/orders/:order_id/resume", post(resume_order))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) struct ApiError {
    status: StatusCode,
    msg: String,
}

impl ApiError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.msg })).into_response()
    }
}

impl From<DeskError> for ApiError {
    fn from(e: DeskError) -> Self {
        let status = match &e {
            DeskError::UnknownPool(_) | DeskError::UnknownOrder(_) => StatusCode::NOT_FOUND,
            DeskError::DuplicatePool(_) => StatusCode::CONFLICT,
            DeskError::InvalidPool(_) | DeskError::Risk(_) => StatusCode::BAD_REQUEST,
            DeskError::Ledger(l) => ledger_status(l),
        };
        Self::new(status, e.to_string())
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::PoolFrozen(_)
        | LedgerError::NotFrozen(_)
        | LedgerError::IllegalTransition(_)
        | LedgerError::InsufficientLiquidity { .. }
        | LedgerError::InvariantViolation(_) => StatusCode::CONFLICT,
        LedgerError::InsufficientAmount { .. }
        | LedgerError::NonPositiveAmount(_)
        | LedgerError::InsufficientCapital { .. }
        | LedgerError::NavNotPositive(_) => StatusCode::BAD_REQUEST,
    }
}

impl From<CycleError> for ApiError {
    fn from(e: CycleError) -> Self {
        match e {
            CycleError::Desk(d) => d.into(),
            CycleError::Ledger(l) => Self::new(ledger_status(&l), l.to_string()),
            CycleError::Feed(_) | CycleError::Source(_) | CycleError::Execution(_) => {
                Self::new(StatusCode::BAD_GATEWAY, e.to_string())
            }
            CycleError::Journal(_) | CycleError::Unbooked { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health  /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let ids = st.desk.pool_ids();
    let frozen_pools = ids
        .iter()
        .copied()
        .filter(|id| {
            st.desk
                .pool(*id)
                .map(|p| p.frozen_reason().is_some())
                .unwrap_or(false)
        })
        .collect();
    let journal = st.desk.journal();
    Json(StatusResponse {
        daemon_uptime_secs: uptime_secs(),
        pools: ids.len(),
        frozen_pools,
        journal_records: journal.len(),
        journal_head: journal.last_hash(),
        config_hash: st.config_hash.clone(),
        cycles_enabled: st.runner.is_some(),
    })
}

// ---------------------------------------------------------------------------
// GET/PUT /v1/book/config
// ---------------------------------------------------------------------------

pub(crate) async fn book_config_get(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.books.get())
}

/// Replace the routing config. An invalid body leaves the current config in place.
pub(crate) async fn book_config_put(
    State(st): State<Arc<AppState>>,
    Json(cfg): Json<BookRoutingConfig>,
) -> Result<Json<BookRoutingConfig>, ApiError> {
    st.books
        .replace(cfg)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    let current = st.books.get();
    info!(default_book = ?current.default_book, "book/config replaced");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "book routing config replaced".to_string(),
    });
    Ok(Json(current))
}

// ---------------------------------------------------------------------------
// Journal reads
// ---------------------------------------------------------------------------

pub(crate) async fn statistics(
    State(st): State<Arc<AppState>>,
    Query(filter): Query<StatsFilter>,
) -> impl IntoResponse {
    Json(st.desk.journal().statistics(&filter))
}

pub(crate) async fn trades(
    State(st): State<Arc<AppState>>,
    Query(filter): Query<TradeFilter>,
) -> impl IntoResponse {
    Json(st.desk.journal().trade_history(&filter))
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

pub(crate) async fn pools(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.desk.summaries())
}

pub(crate) async fn pool_state(
    State(st): State<Arc<AppState>>,
    Path(pool_id): Path<PoolId>,
) -> Result<Json<PoolSummary>, ApiError> {
    Ok(Json(st.desk.summary(pool_id)?))
}

/// Journaled decisions of one pool in creation order.
pub(crate) async fn pool_decisions(
    State(st): State<Arc<AppState>>,
    Path(pool_id): Path<PoolId>,
) -> Result<impl IntoResponse, ApiError> {
    st.desk.pool(pool_id)?;
    Ok(Json(st.desk.journal().decisions_for_pool(pool_id)))
}

/// Today's snapshot, recomputed from current state.
pub(crate) async fn pool_risk(
    State(st): State<Arc<AppState>>,
    Path(pool_id): Path<PoolId>,
) -> Result<Json<RiskStatusResponse>, ApiError> {
    let snapshot = st.desk.evaluate_risk(pool_id, Utc::now())?;
    Ok(Json(RiskStatusResponse { pool_id, snapshot }))
}

pub(crate) async fn subscribe(
    State(st): State<Arc<AppState>>,
    Path(pool_id): Path<PoolId>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let (order, share) = st
        .desk
        .open_subscription(pool_id, req.user_id, req.amount, Utc::now())?;
    st.persist(pool_id).await;
    Ok((StatusCode::CREATED, Json(SubscriptionResponse { order, share })))
}

/// Operator unfreeze.
pub(crate) async fn reconcile(
    State(st): State<Arc<AppState>>,
    Path(pool_id): Path<PoolId>,
) -> Result<Json<PoolStateResponse>, ApiError> {
    st.desk.reconcile(pool_id, Utc::now())?;
    st.persist(pool_id).await;
    let p = st.desk.pool(pool_id)?;
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: format!("pool {pool_id} reconciled and unfrozen"),
    });
    Ok(Json(PoolStateResponse {
        pool: p.pool(),
        open_positions: p.open_positions(),
    }))
}

/// Run one cycle now. 503 when the daemon has no cycle runner.
pub(crate) async fn trigger_cycle(
    State(st): State<Arc<AppState>>,
    Path(pool_id): Path<PoolId>,
) -> Result<Response, ApiError> {
    let Some(runner) = st.runner.as_ref() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "cycle runner not configured",
        ));
    };
    // Unknown pools are 404 before anything runs.
    st.desk.pool(pool_id)?;
    let report = runner.run_cycle(pool_id, Utc::now()).await.map_err(|e| {
        warn!(%pool_id, error = %e, "manual cycle failed");
        ApiError::from(e)
    })?;
    st.publish_cycle(&report);
    st.persist(pool_id).await;
    Ok((StatusCode::OK, Json(report)).into_response())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn top_up(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
    Json(req): Json<TopUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pool_id = st.desk.pool_for_order(order_id)?.pool_id();
    let share = st.desk.top_up(order_id, req.amount, Utc::now())?;
    st.persist(pool_id).await;
    Ok(Json(share))
}

pub(crate) async fn redeem(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<impl IntoResponse, ApiError> {
    let pool_id = st.desk.pool_for_order(order_id)?.pool_id();
    let redemption = st.desk.redeem(order_id, Utc::now())?;
    st.persist(pool_id).await;
    Ok(Json(redemption))
}

/// Risk-driven full exit at NAV, no penalty.
pub(crate) async fn liquidate(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<impl IntoResponse, ApiError> {
    let pool_id = st.desk.pool_for_order(order_id)?.pool_id();
    let redemption = st.desk.liquidate(order_id, Utc::now())?;
    st.persist(pool_id).await;
    Ok(Json(redemption))
}

pub(crate) async fn pause_order(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let pool = st.desk.pool_for_order(order_id)?;
    st.desk.pause_order(order_id, Utc::now())?;
    st.persist(pool.pool_id()).await;
    order_status(&pool, order_id)
}

pub(crate) async fn resume_order(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let pool = st.desk.pool_for_order(order_id)?;
    st.desk.resume_order(order_id, Utc::now())?;
    st.persist(pool.pool_id()).await;
    order_status(&pool, order_id)
}

fn order_status(pool: &PoolRuntime, order_id: OrderId) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order = pool
        .orders()
        .into_iter()
        .find(|o| o.id == order_id)
        .ok_or(DeskError::UnknownOrder(order_id))?;
    Ok(Json(OrderStatusResponse {
        order_id,
        status: order.status,
    }))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Cycle(_) => "cycle",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
