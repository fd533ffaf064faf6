use std::fs;
use std::path::Path;

use crate::{compute_record_hash, JournalError, JournalRecord};

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The entire chain is valid.
    Valid { lines: usize },
    /// The chain is broken at the given line.
    Broken { line: usize, reason: String },
}

/// Verify the hash chain of a journal file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult, JournalError> {
    let content = fs::read_to_string(path.as_ref())?;
    verify_hash_chain_str(&content)
}

/// Verify the hash chain of JSONL content held in memory.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult, JournalError> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let rec: JournalRecord = serde_json::from_str(trimmed).map_err(|e| JournalError::Corrupt {
            line: i + 1,
            reason: e.to_string(),
        })?;
        line_count += 1;

        if rec.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, rec.hash_prev
                ),
            });
        }
        if let Some(ref claimed) = rec.hash_self {
            let recomputed = compute_record_hash(&rec)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }
        prev_hash = rec.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}
