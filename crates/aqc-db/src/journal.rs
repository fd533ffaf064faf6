//! Relational mirror of the decision/trade journal for reporting.

use anyhow::{Context, Result};
use aqc_schemas::{
    BatchId, BookType, Decision, DecisionId, DecisionType, OrderSide, PoolId, Trade, TradeAction,
    TradeId, TradeStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Insert a decision; re-inserting the same id is a no-op.
pub async fn insert_decision(db: &PgPool, d: &Decision) -> Result<()> {
    sqlx::query(
        r#"
        insert into decisions (
          decision_id, pool_id, batch_id, decision_type, action, symbol, suggested_amount,
          suggested_price, stop_loss, take_profit, leverage, reasoning, confidence_score,
          risk_score, created_at, was_executed, execution_price, executed_at, outcome_pnl,
          was_successful, outcome_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
          $19, $20, $21
        )
        on conflict (decision_id) do nothing
        "#,
    )
    .bind(d.id.as_uuid())
    .bind(d.pool_id.as_uuid())
    .bind(d.batch_id.as_str())
    .bind(d.decision_type.as_str())
    .bind(d.action.as_str())
    .bind(&d.symbol)
    .bind(d.suggested_amount)
    .bind(d.suggested_price)
    .bind(d.stop_loss)
    .bind(d.take_profit)
    .bind(d.leverage)
    .bind(&d.reasoning)
    .bind(d.confidence_score)
    .bind(d.risk_score)
    .bind(d.created_at)
    .bind(d.was_executed)
    .bind(d.execution_price)
    .bind(d.executed_at)
    .bind(d.outcome_pnl)
    .bind(d.was_successful)
    .bind(d.outcome_at)
    .execute(db)
    .await
    .with_context(|| format!("insert_decision {} failed", d.id))?;
    Ok(())
}

/// Copy the execution and outcome back-fills of `d` onto its row.
pub async fn update_decision_result(db: &PgPool, d: &Decision) -> Result<()> {
    sqlx::query(
        r#"
        update decisions set
          was_executed = $2,
          execution_price = $3,
          executed_at = $4,
          outcome_pnl = $5,
          was_successful = $6,
          outcome_at = $7
        where decision_id = $1
        "#,
    )
    .bind(d.id.as_uuid())
    .bind(d.was_executed)
    .bind(d.execution_price)
    .bind(d.executed_at)
    .bind(d.outcome_pnl)
    .bind(d.was_successful)
    .bind(d.outcome_at)
    .execute(db)
    .await
    .with_context(|| format!("update_decision_result {} failed", d.id))?;
    Ok(())
}

/// Insert a trade; re-inserting the same id is a no-op.
pub async fn insert_trade(db: &PgPool, t: &Trade) -> Result<()> {
    sqlx::query(
        r#"
        insert into trades (
          trade_id, decision_id, pool_id, book_type, order_id, external_id, symbol, side,
          quantity, filled_qty, avg_price, requested_price, status, is_simulated, error,
          executed_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
        )
        on conflict (trade_id) do nothing
        "#,
    )
    .bind(t.id.as_uuid())
    .bind(t.decision_id.as_uuid())
    .bind(t.pool_id.as_uuid())
    .bind(t.book_type.as_str())
    .bind(&t.order_id)
    .bind(&t.external_id)
    .bind(&t.symbol)
    .bind(t.side.as_str())
    .bind(t.quantity)
    .bind(t.filled_qty)
    .bind(t.avg_price)
    .bind(t.requested_price)
    .bind(t.status.as_str())
    .bind(t.is_simulated)
    .bind(&t.error)
    .bind(t.executed_at)
    .execute(db)
    .await
    .with_context(|| format!("insert_trade {} failed", t.id))?;
    Ok(())
}

/// Decisions of a pool in creation order.
pub async fn load_decisions(db: &PgPool, pool_id: PoolId) -> Result<Vec<Decision>> {
    sqlx::query("select * from decisions where pool_id = $1 order by created_at, decision_id")
        .bind(pool_id.as_uuid())
        .fetch_all(db)
        .await
        .context("load_decisions failed")?
        .iter()
        .map(decision_from_row)
        .collect()
}

/// Trades of a pool, newest first.
pub async fn load_trades(db: &PgPool, pool_id: PoolId, limit: i64) -> Result<Vec<Trade>> {
    sqlx::query(
        "select * from trades where pool_id = $1 order by executed_at desc, trade_id limit $2",
    )
    .bind(pool_id.as_uuid())
    .bind(limit)
    .fetch_all(db)
    .await
    .context("load_trades failed")?
    .iter()
    .map(trade_from_row)
    .collect()
}

fn decision_from_row(row: &PgRow) -> Result<Decision> {
    let decision_type: String = row.try_get("decision_type")?;
    let action: String = row.try_get("action")?;
    Ok(Decision {
        id: DecisionId(row.try_get("decision_id")?),
        pool_id: PoolId(row.try_get("pool_id")?),
        batch_id: BatchId(row.try_get("batch_id")?),
        decision_type: DecisionType::parse(&decision_type)?,
        action: TradeAction::parse(&action)?,
        symbol: row.try_get("symbol")?,
        suggested_amount: row.try_get("suggested_amount")?,
        suggested_price: row.try_get("suggested_price")?,
        stop_loss: row.try_get("stop_loss")?,
        take_profit: row.try_get("take_profit")?,
        leverage: row.try_get("leverage")?,
        reasoning: row.try_get("reasoning")?,
        confidence_score: row.try_get("confidence_score")?,
        risk_score: row.try_get("risk_score")?,
        created_at: row.try_get("created_at")?,
        was_executed: row.try_get("was_executed")?,
        execution_price: row.try_get("execution_price")?,
        executed_at: row.try_get("executed_at")?,
        outcome_pnl: row.try_get("outcome_pnl")?,
        was_successful: row.try_get("was_successful")?,
        outcome_at: row.try_get("outcome_at")?,
    })
}

fn trade_from_row(row: &PgRow) -> Result<Trade> {
    let book: String = row.try_get("book_type")?;
    let side: String = row.try_get("side")?;
    let status: String = row.try_get("status")?;
    Ok(Trade {
        id: TradeId(row.try_get("trade_id")?),
        decision_id: DecisionId(row.try_get("decision_id")?),
        pool_id: PoolId(row.try_get("pool_id")?),
        book_type: BookType::parse(&book)?,
        order_id: row.try_get("order_id")?,
        external_id: row.try_get("external_id")?,
        symbol: row.try_get("symbol")?,
        side: OrderSide::parse(&side)?,
        quantity: row.try_get("quantity")?,
        filled_qty: row.try_get("filled_qty")?,
        avg_price: row.try_get("avg_price")?,
        requested_price: row.try_get("requested_price")?,
        status: TradeStatus::parse(&status)?,
        is_simulated: row.try_get("is_simulated")?,
        error: row.try_get("error")?,
        executed_at: row.try_get("executed_at")?,
    })
}
