//! Sanity gate for incoming marks.
//!
//! Rejects non-positive prices and, when a previous mark is known, jumps
//! larger than `max_jump_pct` percent. Rejected marks are reported and left
//! out of the accepted map so they never reach mark-to-market.

use std::fmt;

use aqc_schemas::PriceMap;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceIssue {
    NonPositive,
    Jump,
}

impl fmt::Display for PriceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceIssue::NonPositive => f.write_str("non-positive price"),
            PriceIssue::Jump => f.write_str("price jump above limit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPrice {
    pub symbol: String,
    pub price: Decimal,
    pub issue: PriceIssue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceCheck {
    pub accepted: PriceMap,
    pub rejected: Vec<RejectedPrice>,
}

impl PriceCheck {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub fn validate_prices(
    prices: &PriceMap,
    previous: Option<&PriceMap>,
    max_jump_pct: Option<Decimal>,
) -> PriceCheck {
    let mut out = PriceCheck::default();
    for (symbol, &price) in prices {
        let issue = if price <= Decimal::ZERO {
            Some(PriceIssue::NonPositive)
        } else {
            match (previous.and_then(|p| p.get(symbol)), max_jump_pct) {
                (Some(&prev), Some(limit)) if prev > Decimal::ZERO => {
                    let jump = ((price - prev) / prev * Decimal::ONE_HUNDRED).abs();
                    (jump > limit).then_some(PriceIssue::Jump)
                }
                _ => None,
            }
        };
        match issue {
            Some(issue) => out.rejected.push(RejectedPrice {
                symbol: symbol.clone(),
                price,
                issue,
            }),
            None => {
                out.accepted.insert(symbol.clone(), price);
            }
        }
    }
    out
}
