//! aqc-db
//!
//! Postgres persistence for pools, investor orders, positions, the decision
//! and trade journal, and daily risk snapshots.
//!
//! - Schema lives in `migrations/` and is embedded with `sqlx::migrate!`.
//! - [`save_pool_state`] is the per-pool critical section: pool, orders and
//!   shares are written in one transaction under `SELECT ... FOR UPDATE` on
//!   the pool row.
//! - Rows are decoded into the typed entities of `aqc-portfolio`,
//!   `aqc-risk` and `aqc-schemas`; closed enums round-trip through their
//!   `as_str`/`parse` mappings.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod journal;
mod ledger;
mod positions;
mod risk;

pub use journal::{insert_decision, insert_trade, load_decisions, load_trades, update_decision_result};
pub use ledger::{load_pool_state, save_pool_state, PoolState};
pub use positions::{load_open_positions, upsert_position};
pub use risk::{load_risk_snapshots, upsert_risk_snapshot};

pub const ENV_DB_URL: &str = "AQC_DATABASE_URL";

/// Connect to Postgres using AQC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_pools_table: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'pools'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_pools_table: exists,
    })
}

/// Postgres unique violation (23505) on `constraint`.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// Postgres CHECK violation (23514).
pub fn is_check_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23514"),
        _ => false,
    }
}
