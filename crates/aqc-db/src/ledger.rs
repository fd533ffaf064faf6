use anyhow::{anyhow, Context, Result};
use aqc_portfolio::{InvestmentOrder, OrderShare, OrderStatus, Pool, PoolStatus};
use aqc_schemas::{OrderId, PoolId, StrategyId, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Rows needed by `PoolLedger::restore`.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolState {
    pub pool: Pool,
    pub orders: Vec<InvestmentOrder>,
    pub shares: Vec<OrderShare>,
}

/// Persist one pool's ledger state atomically.
///
/// The pool row is created on first save; afterwards it is locked with
/// `FOR UPDATE` before anything is written so concurrent writers for the same
/// pool serialize. Orders and shares are upserted by id.
pub async fn save_pool_state(
    db: &PgPool,
    pool: &Pool,
    orders: &[InvestmentOrder],
    shares: &[OrderShare],
) -> Result<()> {
    let mut tx = db.begin().await.context("save_pool_state begin failed")?;

    sqlx::query(
        r#"
        insert into pools (pool_id, strategy_id, current_nav_per_share, created_at, updated_at)
        values ($1, $2, $3, $4, $5)
        on conflict (pool_id) do nothing
        "#,
    )
    .bind(pool.id.as_uuid())
    .bind(pool.strategy_id.as_str())
    .bind(pool.current_nav_per_share)
    .bind(pool.created_at)
    .bind(pool.updated_at)
    .execute(&mut *tx)
    .await
    .context("save_pool_state seed pool row failed")?;

    sqlx::query("select pool_id from pools where pool_id = $1 for update")
        .bind(pool.id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .context("save_pool_state lock pool row failed")?;

    sqlx::query(
        r#"
        update pools set
          status = $2,
          frozen_reason = $3,
          total_capital = $4,
          available_capital = $5,
          locked_capital = $6,
          current_nav_per_share = $7,
          total_shares_outstanding = $8,
          unrealized_pnl = $9,
          realized_pnl = $10,
          win_rate = $11,
          total_trades = $12,
          winning_trades = $13,
          updated_at = $14
        where pool_id = $1
        "#,
    )
    .bind(pool.id.as_uuid())
    .bind(pool.status.as_str())
    .bind(&pool.frozen_reason)
    .bind(pool.total_capital)
    .bind(pool.available_capital)
    .bind(pool.locked_capital)
    .bind(pool.current_nav_per_share)
    .bind(pool.total_shares_outstanding)
    .bind(pool.unrealized_pnl)
    .bind(pool.realized_pnl)
    .bind(pool.win_rate)
    .bind(to_i64(pool.total_trades)?)
    .bind(to_i64(pool.winning_trades)?)
    .bind(pool.updated_at)
    .execute(&mut *tx)
    .await
    .context("save_pool_state update pool failed")?;

    for o in orders {
        if o.pool_id != pool.id {
            return Err(anyhow!("order {} belongs to pool {}, not {}", o.id, o.pool_id, pool.id));
        }
        sqlx::query(
            r#"
            insert into investment_orders (
              order_id, user_id, pool_id, invested_amount, currency, status,
              lock_period_end, realized_profit, total_fees_paid, created_at, closed_at
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            on conflict (order_id) do update set
              invested_amount = excluded.invested_amount,
              status = excluded.status,
              realized_profit = excluded.realized_profit,
              total_fees_paid = excluded.total_fees_paid,
              closed_at = excluded.closed_at
            "#,
        )
        .bind(o.id.as_uuid())
        .bind(o.user_id.as_str())
        .bind(o.pool_id.as_uuid())
        .bind(o.invested_amount)
        .bind(&o.currency)
        .bind(o.status.as_str())
        .bind(o.lock_period_end)
        .bind(o.realized_profit)
        .bind(o.total_fees_paid)
        .bind(o.created_at)
        .bind(o.closed_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("save_pool_state upsert order {} failed", o.id))?;
    }

    for s in shares {
        sqlx::query(
            r#"
            insert into order_shares (
              order_id, pool_id, shares_owned, avg_entry_nav, share_percentage, total_invested
            ) values ($1, $2, $3, $4, $5, $6)
            on conflict (order_id) do update set
              shares_owned = excluded.shares_owned,
              avg_entry_nav = excluded.avg_entry_nav,
              share_percentage = excluded.share_percentage,
              total_invested = excluded.total_invested
            "#,
        )
        .bind(s.order_id.as_uuid())
        .bind(s.pool_id.as_uuid())
        .bind(s.shares_owned)
        .bind(s.avg_entry_nav)
        .bind(s.share_percentage)
        .bind(s.total_invested)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("save_pool_state upsert share {} failed", s.order_id))?;
    }

    tx.commit().await.context("save_pool_state commit failed")?;
    Ok(())
}

/// Load a pool with its orders and shares; `None` if the pool was never saved.
pub async fn load_pool_state(db: &PgPool, pool_id: PoolId) -> Result<Option<PoolState>> {
    let row = sqlx::query(
        r#"
        select pool_id, strategy_id, status, frozen_reason, total_capital, available_capital,
               locked_capital, current_nav_per_share, total_shares_outstanding, unrealized_pnl,
               realized_pnl, win_rate, total_trades, winning_trades, created_at, updated_at
        from pools
        where pool_id = $1
        "#,
    )
    .bind(pool_id.as_uuid())
    .fetch_optional(db)
    .await
    .context("load_pool_state pool query failed")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let pool = pool_from_row(&row)?;

    let orders = sqlx::query(
        r#"
        select order_id, user_id, pool_id, invested_amount, currency, status,
               lock_period_end, realized_profit, total_fees_paid, created_at, closed_at
        from investment_orders
        where pool_id = $1
        order by created_at, order_id
        "#,
    )
    .bind(pool_id.as_uuid())
    .fetch_all(db)
    .await
    .context("load_pool_state orders query failed")?
    .iter()
    .map(order_from_row)
    .collect::<Result<Vec<_>>>()?;

    let shares = sqlx::query(
        r#"
        select order_id, pool_id, shares_owned, avg_entry_nav, share_percentage, total_invested
        from order_shares
        where pool_id = $1
        order by order_id
        "#,
    )
    .bind(pool_id.as_uuid())
    .fetch_all(db)
    .await
    .context("load_pool_state shares query failed")?
    .iter()
    .map(|r| {
        Ok(OrderShare {
            order_id: OrderId(r.try_get("order_id")?),
            pool_id: PoolId(r.try_get("pool_id")?),
            shares_owned: r.try_get("shares_owned")?,
            avg_entry_nav: r.try_get("avg_entry_nav")?,
            share_percentage: r.try_get("share_percentage")?,
            total_invested: r.try_get("total_invested")?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    Ok(Some(PoolState { pool, orders, shares }))
}

fn pool_from_row(row: &PgRow) -> Result<Pool> {
    let status: String = row.try_get("status")?;
    Ok(Pool {
        id: PoolId(row.try_get("pool_id")?),
        strategy_id: StrategyId(row.try_get("strategy_id")?),
        status: PoolStatus::parse(&status).ok_or_else(|| anyhow!("invalid pool status: {status}"))?,
        frozen_reason: row.try_get("frozen_reason")?,
        total_capital: row.try_get("total_capital")?,
        available_capital: row.try_get("available_capital")?,
        locked_capital: row.try_get("locked_capital")?,
        current_nav_per_share: row.try_get("current_nav_per_share")?,
        total_shares_outstanding: row.try_get("total_shares_outstanding")?,
        unrealized_pnl: row.try_get("unrealized_pnl")?,
        realized_pnl: row.try_get("realized_pnl")?,
        win_rate: row.try_get("win_rate")?,
        total_trades: to_u64(row.try_get("total_trades")?)?,
        winning_trades: to_u64(row.try_get("winning_trades")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<InvestmentOrder> {
    let status: String = row.try_get("status")?;
    Ok(InvestmentOrder {
        id: OrderId(row.try_get("order_id")?),
        user_id: UserId(row.try_get("user_id")?),
        pool_id: PoolId(row.try_get("pool_id")?),
        invested_amount: row.try_get("invested_amount")?,
        currency: row.try_get("currency")?,
        status: OrderStatus::parse(&status).ok_or_else(|| anyhow!("invalid order status: {status}"))?,
        lock_period_end: row.try_get("lock_period_end")?,
        realized_profit: row.try_get("realized_profit")?,
        total_fees_paid: row.try_get("total_fees_paid")?,
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("counter {v} out of range"))
}

fn to_u64(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| anyhow!("negative counter {v}"))
}
