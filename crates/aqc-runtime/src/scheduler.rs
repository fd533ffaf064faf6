//! Periodic cycle driver: one tokio task per pool, each with an explicit
//! cancellation handle.

use std::sync::Arc;
use std::time::Duration;

use aqc_schemas::PoolId;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::cycle::{CycleReport, CycleRunner};

/// Called with every completed cycle report (e.g. to publish on an event bus).
pub type ReportHook = Arc<dyn Fn(&CycleReport) + Send + Sync>;

pub struct CycleScheduler {
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    hook: Option<ReportHook>,
}

impl CycleScheduler {
    pub fn new(runner: Arc<dyn CycleRunner>, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: ReportHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Start the cycle loop for one pool. The first cycle runs immediately;
    /// ticks missed while a cycle is still running are skipped, not queued.
    pub fn spawn(&self, pool_id: PoolId) -> ScheduleHandle {
        let (cancel, mut cancelled) = watch::channel(false);
        let runner = Arc::clone(&self.runner);
        let hook = self.hook.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(%pool_id, interval_ms = period.as_millis() as u64, "cycle schedule started");
            loop {
                tokio::select! {
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match runner.run_cycle(pool_id, Utc::now()).await {
                            Ok(report) => {
                                if let Some(hook) = &hook {
                                    hook(&report);
                                }
                            }
                            Err(e) => error!(%pool_id, error = %e, "cycle failed"),
                        }
                    }
                }
            }
            info!(%pool_id, "cycle schedule stopped");
        });

        ScheduleHandle {
            pool_id,
            cancel,
            task,
        }
    }

    pub fn spawn_all(&self, pool_ids: impl IntoIterator<Item = PoolId>) -> Vec<ScheduleHandle> {
        pool_ids.into_iter().map(|id| self.spawn(id)).collect()
    }
}

/// Owner of a scheduled pool loop. Dropping the handle cancels the loop.
pub struct ScheduleHandle {
    pool_id: PoolId,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Stop after the in-flight cycle (if any) finishes.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            error!(pool_id = %self.pool_id, error = %e, "cycle task ended abnormally");
        }
    }
}
