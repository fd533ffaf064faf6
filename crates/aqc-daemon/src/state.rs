//! Shared runtime state for aqc-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The desk and the book
//! config store carry their own locks; this module adds the SSE bus, the
//! optional cycle runner and the optional Postgres mirror.

use std::sync::Arc;
use std::time::Duration;

use aqc_execution::BookConfigStore;
use aqc_runtime::{CycleReport, CycleRunner, CycleScheduler, ReportHook, ScheduleHandle, TradingDesk};
use tracing::warn;
use aqc_schemas::{BatchId, DecisionId, PoolId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::store::DeskStore;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Cycle(CycleEvent),
    LogLine { level: String, msg: String },
}

/// Compact form of a [`CycleReport`] for dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub pool_id: PoolId,
    pub batch_id: BatchId,
    pub tick: DateTime<Utc>,
    pub outcome: String,
    pub decision_id: Option<DecisionId>,
    pub trigger_closes: usize,
    pub can_trade: Option<bool>,
}

impl From<&CycleReport> for CycleEvent {
    fn from(r: &CycleReport) -> Self {
        Self {
            pool_id: r.pool_id,
            batch_id: r.batch_id.clone(),
            tick: r.tick,
            outcome: r.outcome.label().to_string(),
            decision_id: r.outcome.decision_id(),
            trigger_closes: r.trigger_closes.len(),
            can_trade: r.risk.as_ref().map(|s| s.can_trade),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub desk: Arc<TradingDesk>,
    /// Same store the execution router reads, so PUTs take effect next cycle.
    pub books: BookConfigStore,
    /// `None` when the daemon serves reporting only.
    pub runner: Option<Arc<dyn CycleRunner>>,
    /// `None` when no database is configured.
    pub store: Option<DeskStore>,
    pub config_hash: Option<String>,
}

impl AppState {
    pub fn new(desk: Arc<TradingDesk>, books: BookConfigStore) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "aqc-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            desk,
            books,
            runner: None,
            store: None,
            config_hash: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CycleRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_store(mut self, store: DeskStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Publish a finished cycle on the bus.
    pub fn publish_cycle(&self, report: &CycleReport) {
        let _ = self.bus.send(BusMsg::Cycle(CycleEvent::from(report)));
    }

    /// Write `pool_id` through to the store, if any.
    ///
    /// Failures are logged and surfaced on the bus; the in-memory state is
    /// already committed.
    pub async fn persist(&self, pool_id: PoolId) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.save_pool(&self.desk, pool_id).await {
            warn!(%pool_id, error = %e, "persist failed");
            let _ = self.bus.send(BusMsg::LogLine {
                level: "WARN".to_string(),
                msg: format!("persist {pool_id} failed: {e}"),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Scheduler hook that publishes every report and persists its pool.
pub fn cycle_hook(state: Arc<AppState>) -> ReportHook {
    Arc::new(move |report: &CycleReport| {
        state.publish_cycle(report);
        if state.store.is_some() {
            let st = Arc::clone(&state);
            let pool_id = report.pool_id;
            tokio::spawn(async move { st.persist(pool_id).await });
        }
    })
}

/// One cycle task per registered pool.
///
/// Empty when the daemon has no runner.
pub fn spawn_cycle_schedule(state: &Arc<AppState>, interval: Duration) -> Vec<ScheduleHandle> {
    let Some(runner) = state.runner.as_ref() else {
        return Vec::new();
    };
    CycleScheduler::new(Arc::clone(runner), interval)
        .with_hook(cycle_hook(Arc::clone(state)))
        .spawn_all(state.desk.pool_ids())
}
