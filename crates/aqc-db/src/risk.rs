use anyhow::{anyhow, Context, Result};
use aqc_risk::{PauseReason, RiskSnapshot};
use aqc_schemas::PoolId;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// One row per (pool, UTC day); a later evaluation the same day overwrites it.
pub async fn upsert_risk_snapshot(db: &PgPool, s: &RiskSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        insert into risk_snapshots (
          pool_id, day, risk_profile, daily_pnl, daily_pnl_pct, exposure_pct, can_trade,
          pause_reason, max_loss_remaining, max_profit_remaining, target_reached,
          open_positions, trades_executed, evaluated_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        on conflict on constraint uq_risk_snapshots_pool_day do update set
          risk_profile = excluded.risk_profile,
          daily_pnl = excluded.daily_pnl,
          daily_pnl_pct = excluded.daily_pnl_pct,
          exposure_pct = excluded.exposure_pct,
          can_trade = excluded.can_trade,
          pause_reason = excluded.pause_reason,
          max_loss_remaining = excluded.max_loss_remaining,
          max_profit_remaining = excluded.max_profit_remaining,
          target_reached = excluded.target_reached,
          open_positions = excluded.open_positions,
          trades_executed = excluded.trades_executed,
          evaluated_at = excluded.evaluated_at
        "#,
    )
    .bind(s.pool_id.as_uuid())
    .bind(s.day)
    .bind(&s.risk_profile)
    .bind(s.daily_pnl)
    .bind(s.daily_pnl_pct)
    .bind(s.exposure_pct)
    .bind(s.can_trade)
    .bind(s.pause_reason.as_ref().map(|r| r.as_str()))
    .bind(s.max_loss_remaining)
    .bind(s.max_profit_remaining)
    .bind(s.target_reached)
    .bind(i32::try_from(s.open_positions)?)
    .bind(i32::try_from(s.trades_executed)?)
    .bind(s.evaluated_at)
    .execute(db)
    .await
    .with_context(|| format!("upsert_risk_snapshot {} {} failed", s.pool_id, s.day))?;
    Ok(())
}

/// Snapshot history of a pool, oldest day first.
pub async fn load_risk_snapshots(db: &PgPool, pool_id: PoolId) -> Result<Vec<RiskSnapshot>> {
    sqlx::query("select * from risk_snapshots where pool_id = $1 order by day")
        .bind(pool_id.as_uuid())
        .fetch_all(db)
        .await
        .context("load_risk_snapshots failed")?
        .iter()
        .map(snapshot_from_row)
        .collect()
}

fn snapshot_from_row(row: &PgRow) -> Result<RiskSnapshot> {
    let pause: Option<String> = row.try_get("pause_reason")?;
    let pause_reason = match pause.as_deref() {
        None => None,
        Some(s) => Some(PauseReason::parse(s).ok_or_else(|| anyhow!("invalid pause reason: {s}"))?),
    };
    Ok(RiskSnapshot {
        pool_id: PoolId(row.try_get("pool_id")?),
        day: row.try_get("day")?,
        risk_profile: row.try_get("risk_profile")?,
        daily_pnl: row.try_get("daily_pnl")?,
        daily_pnl_pct: row.try_get("daily_pnl_pct")?,
        exposure_pct: row.try_get("exposure_pct")?,
        can_trade: row.try_get("can_trade")?,
        pause_reason,
        max_loss_remaining: row.try_get("max_loss_remaining")?,
        max_profit_remaining: row.try_get("max_profit_remaining")?,
        target_reached: row.try_get("target_reached")?,
        open_positions: u32::try_from(row.try_get::<i32, _>("open_positions")?)?,
        trades_executed: u32::try_from(row.try_get::<i32, _>("trades_executed")?)?,
        evaluated_at: row.try_get("evaluated_at")?,
    })
}
