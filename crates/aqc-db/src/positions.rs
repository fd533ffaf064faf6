use anyhow::{Context, Result};
use aqc_portfolio::Position;
use aqc_schemas::{CloseReason, DecisionId, PoolId, PositionId, PositionSide};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Insert or refresh a position. Closing fields are written once set.
pub async fn upsert_position(db: &PgPool, p: &Position) -> Result<()> {
    sqlx::query(
        r#"
        insert into positions (
          position_id, pool_id, decision_id, symbol, side, entry_price, current_price,
          quantity, leverage, notional_value, margin_used, initial_margin, unrealized_pnl,
          unrealized_pnl_pct, stop_loss, take_profit, liquidation_price, opened_at,
          closed_at, exit_price, close_reason, realized_pnl
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
          $19, $20, $21, $22
        )
        on conflict (position_id) do update set
          current_price = excluded.current_price,
          quantity = excluded.quantity,
          notional_value = excluded.notional_value,
          margin_used = excluded.margin_used,
          initial_margin = excluded.initial_margin,
          unrealized_pnl = excluded.unrealized_pnl,
          unrealized_pnl_pct = excluded.unrealized_pnl_pct,
          closed_at = excluded.closed_at,
          exit_price = excluded.exit_price,
          close_reason = excluded.close_reason,
          realized_pnl = excluded.realized_pnl
        "#,
    )
    .bind(p.id.as_uuid())
    .bind(p.pool_id.as_uuid())
    .bind(p.decision_id.map(|d| d.as_uuid()))
    .bind(&p.symbol)
    .bind(p.side.as_str())
    .bind(p.entry_price)
    .bind(p.current_price)
    .bind(p.quantity)
    .bind(p.leverage)
    .bind(p.notional_value)
    .bind(p.margin_used)
    .bind(p.initial_margin)
    .bind(p.unrealized_pnl)
    .bind(p.unrealized_pnl_pct)
    .bind(p.stop_loss)
    .bind(p.take_profit)
    .bind(p.liquidation_price)
    .bind(p.opened_at)
    .bind(p.closed_at)
    .bind(p.exit_price)
    .bind(p.close_reason.as_ref().map(|r| r.as_str()))
    .bind(p.realized_pnl)
    .execute(db)
    .await
    .with_context(|| format!("upsert_position {} failed", p.id))?;
    Ok(())
}

/// Open positions of a pool, oldest first.
pub async fn load_open_positions(db: &PgPool, pool_id: PoolId) -> Result<Vec<Position>> {
    sqlx::query(
        r#"
        select *
        from positions
        where pool_id = $1 and closed_at is null
        order by opened_at, position_id
        "#,
    )
    .bind(pool_id.as_uuid())
    .fetch_all(db)
    .await
    .context("load_open_positions failed")?
    .iter()
    .map(position_from_row)
    .collect()
}

fn position_from_row(row: &PgRow) -> Result<Position> {
    let side: String = row.try_get("side")?;
    let close_reason: Option<String> = row.try_get("close_reason")?;
    Ok(Position {
        id: PositionId(row.try_get("position_id")?),
        pool_id: PoolId(row.try_get("pool_id")?),
        decision_id: row.try_get::<Option<uuid::Uuid>, _>("decision_id")?.map(DecisionId),
        symbol: row.try_get("symbol")?,
        side: PositionSide::parse(&side)?,
        entry_price: row.try_get("entry_price")?,
        current_price: row.try_get("current_price")?,
        quantity: row.try_get("quantity")?,
        leverage: row.try_get("leverage")?,
        notional_value: row.try_get("notional_value")?,
        margin_used: row.try_get("margin_used")?,
        initial_margin: row.try_get("initial_margin")?,
        unrealized_pnl: row.try_get("unrealized_pnl")?,
        unrealized_pnl_pct: row.try_get("unrealized_pnl_pct")?,
        stop_loss: row.try_get("stop_loss")?,
        take_profit: row.try_get("take_profit")?,
        liquidation_price: row.try_get("liquidation_price")?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        exit_price: row.try_get("exit_price")?,
        close_reason: close_reason.as_deref().map(CloseReason::parse).transpose()?,
        realized_pnl: row.try_get("realized_pnl")?,
    })
}
