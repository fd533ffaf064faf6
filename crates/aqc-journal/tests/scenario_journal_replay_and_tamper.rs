//! A hash-chained journal file survives a restart (replay rebuilds the index
//! and the chain continues) and detects an edited line.

use aqc_journal::{verify_hash_chain, Journal, JournalError, StatsFilter, VerifyResult};
use aqc_schemas::{BatchId, Decision, PoolId, ProposedDecision, TradeAction};
use chrono::Utc;
use rust_decimal_macros::dec;

fn decision(pool: PoolId, batch: &str) -> Decision {
    let p = ProposedDecision {
        action: TradeAction::Short,
        symbol: "ETHUSDT".into(),
        quantity: dec!(2),
        suggested_price: Some(dec!(2500)),
        stop_loss: Some(dec!(2600)),
        take_profit: Some(dec!(2300)),
        leverage: dec!(3),
        reasoning: "mean reversion".into(),
        confidence_score: 0.7,
        risk_score: 0.4,
    };
    Decision::from_proposal(pool, BatchId::new(batch), &p, Utc::now())
}

#[test]
fn replay_restores_index_and_continues_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal").join("decisions.jsonl");
    let pool = PoolId::new();
    let first = decision(pool, "batch-1");

    {
        let j = Journal::replay(&path, true).unwrap();
        j.record_decision(&first).unwrap();
        j.record_execution(first.id, dec!(2499.5), Utc::now()).unwrap();
        j.record_outcome(first.id, dec!(150.25), true, Utc::now()).unwrap();
        assert_eq!(j.len(), 3);
    }

    let j = Journal::replay(&path, true).unwrap();
    assert_eq!(j.len(), 3);
    assert!(j.has_batch(pool, &BatchId::new("batch-1")));
    let back = j.decision(first.id).unwrap();
    assert!(back.was_executed);
    assert_eq!(back.execution_price, Some(dec!(2499.5)));
    assert_eq!(back.outcome_pnl, Some(dec!(150.25)));

    // Re-applying the same outcome after restart is still a no-op.
    assert!(!j.record_outcome(first.id, dec!(150.25), true, Utc::now()).unwrap());

    let second = decision(pool, "batch-2");
    j.record_decision(&second).unwrap();
    drop(j);

    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 4 });
    let j = Journal::replay(&path, true).unwrap();
    let stats = j.statistics(&StatsFilter {
        pool_id: Some(pool),
        ..Default::default()
    });
    assert_eq!(stats.total_decisions, 2);
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.total_pnl, dec!(150.25));
}

#[test]
fn edited_line_breaks_chain_and_refuses_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("decisions.jsonl");
    let pool = PoolId::new();
    {
        let j = Journal::replay(&path, true).unwrap();
        for i in 0..4 {
            j.record_decision(&decision(pool, &format!("b{i}"))).unwrap();
        }
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    lines[2] = lines[2].replace("mean reversion", "momentum");
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3);
            assert!(reason.contains("hash_self mismatch"), "{reason}");
        }
        other => panic!("expected broken chain, got {other:?}"),
    }
    assert!(matches!(
        Journal::replay(&path, true),
        Err(JournalError::Corrupt { line: 3, .. })
    ));
}
