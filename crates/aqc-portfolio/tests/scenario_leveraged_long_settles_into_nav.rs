//! Pool capital 100,000; long BTCUSDT 1 @ 40,000 x5 uses 8,000 margin; a move
//! to 44,000 shows +4,000 (50% of margin) and closing books it into realized
//! P&L with NAV per share moving up.

use aqc_portfolio::{LedgerParams, PoolLedger, PositionBook, PositionLimits};
use aqc_schemas::{CloseReason, PoolId, PositionSide, PriceMap, StrategyId, UserId};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

#[test]
fn leveraged_long_marks_and_settles() {
    let now = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
    let pool_id = PoolId::new();
    let mut ledger = PoolLedger::new(pool_id, StrategyId::new("trend"), LedgerParams::default(), now);
    ledger
        .open_subscription(UserId::new("investor-1"), dec!(100000), now)
        .unwrap();
    let nav_before = ledger.pool().current_nav_per_share;

    let limits = PositionLimits {
        max_position_pct: dec!(20),
        max_leverage: dec!(5),
    };
    let mut book = PositionBook::new(pool_id, dec!(0.9));
    let pos = book
        .open(
            None,
            "BTCUSDT",
            PositionSide::Long,
            dec!(1),
            dec!(40000),
            dec!(5),
            None,
            None,
            ledger.pool().total_capital,
            ledger.margin_capacity(),
            &limits,
            now,
        )
        .unwrap();
    assert_eq!(pos.margin_used, dec!(8000));
    ledger.reserve_margin(pos.initial_margin, now).unwrap();
    assert_eq!(ledger.pool().available_capital, dec!(92000));
    assert_eq!(ledger.pool().locked_capital, dec!(8000));

    let mut tick = PriceMap::new();
    tick.insert("BTCUSDT".to_string(), dec!(44000));
    let report = book.mark_to_market(&tick);
    assert!(report.triggers.is_empty());
    let marked = book.get(pos.id).unwrap();
    assert_eq!(marked.unrealized_pnl, dec!(4000));
    assert_eq!(marked.unrealized_pnl_pct, dec!(50));
    assert_eq!(marked.notional_value, dec!(44000));
    ledger.apply_unrealized(report.unrealized_pnl, now).unwrap();
    assert_eq!(ledger.pool().current_nav_per_share, dec!(1.04));

    let closed = book.close(pos.id, dec!(44000), CloseReason::Manual, now).unwrap();
    assert_eq!(closed.realized_pnl, dec!(4000));
    ledger.release_margin(closed.margin_released, now).unwrap();
    ledger.apply_unrealized(book.unrealized_pnl(), now).unwrap();
    ledger.settle_trade(closed.realized_pnl, now).unwrap();

    let pool = ledger.pool();
    assert_eq!(pool.realized_pnl, dec!(4000));
    assert_eq!(pool.available_capital + pool.locked_capital, pool.total_capital);
    assert!(pool.current_nav_per_share > nav_before);
    assert_eq!(pool.current_nav_per_share, dec!(1.04));
    assert_eq!(pool.win_rate, dec!(100));
}
