//! Optional Postgres mirror of desk state.
//!
//! The in-memory desk stays authoritative while the daemon runs. The store
//! writes a pool through after every state change and rebuilds the desk from
//! the saved rows on startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use aqc_config::DeskSettings;
use aqc_journal::{Journal, TradeFilter};
use aqc_portfolio::PoolLedger;
use aqc_runtime::{PoolSpec, TradingDesk};
use aqc_schemas::PoolId;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

#[derive(Clone)]
pub struct DeskStore {
    db: PgPool,
}

impl DeskStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Desk with every configured pool, restored where a saved row exists
    /// and registered fresh otherwise. Only today's risk snapshot is reloaded
    /// so a closed gate survives a restart within the same UTC day.
    pub async fn load_desk(
        &self,
        settings: &DeskSettings,
        journal: Arc<Journal>,
        now: DateTime<Utc>,
    ) -> Result<TradingDesk> {
        let desk = TradingDesk::configured(settings, journal).context("build desk")?;
        let today = now.date_naive();
        for p in &settings.pools {
            let spec = PoolSpec::from(p);
            let pool_id = spec.pool_id;
            match aqc_db::load_pool_state(&self.db, pool_id).await? {
                None => {
                    desk.register_pool(spec, now)?;
                }
                Some(state) => {
                    let ledger = PoolLedger::restore(
                        state.pool,
                        state.orders,
                        state.shares,
                        desk.params().ledger.clone(),
                    );
                    let positions = aqc_db::load_open_positions(&self.db, pool_id).await?;
                    let risk_today = aqc_db::load_risk_snapshots(&self.db, pool_id)
                        .await?
                        .into_iter()
                        .filter(|s| s.day == today)
                        .collect();
                    info!(%pool_id, open_positions = positions.len(), "pool restored from db");
                    desk.restore_pool(spec, ledger, positions, risk_today)?;
                }
            }
        }
        Ok(desk)
    }

    /// Write one pool through: ledger rows, its journal rows, every position
    /// and the latest risk snapshot.
    pub async fn save_pool(&self, desk: &TradingDesk, pool_id: PoolId) -> Result<()> {
        let rt = desk.pool(pool_id)?;
        aqc_db::save_pool_state(&self.db, &rt.pool(), &rt.orders(), &rt.shares()).await?;

        // positions and trades reference decisions
        for d in desk.journal().decisions_for_pool(pool_id) {
            aqc_db::insert_decision(&self.db, &d).await?;
            if d.was_executed || d.has_outcome() {
                aqc_db::update_decision_result(&self.db, &d).await?;
            }
        }
        let trades = desk.journal().trade_history(&TradeFilter {
            pool_id: Some(pool_id),
            ..TradeFilter::default()
        });
        for t in &trades {
            aqc_db::insert_trade(&self.db, t).await?;
        }
        for p in rt.closed_positions().iter().chain(rt.open_positions().iter()) {
            aqc_db::upsert_position(&self.db, p).await?;
        }
        if let Some(snapshot) = rt.latest_risk() {
            aqc_db::upsert_risk_snapshot(&self.db, &snapshot).await?;
        }
        Ok(())
    }
}
