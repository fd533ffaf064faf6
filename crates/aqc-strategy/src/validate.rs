use aqc_schemas::{MarketSnapshot, PositionSide, ProposedDecision, TradeAction};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProposalRejection {
    #[error("empty symbol")]
    EmptySymbol,
    #[error("symbol {0} is not traded by this pool")]
    UnknownSymbol(String),
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),
    #[error("leverage must be >= 1, got {0}")]
    InvalidLeverage(Decimal),
    #[error("{field} must be within [0, 1], got {value}")]
    ScoreOutOfRange { field: &'static str, value: f64 },
    #[error("no price available for {0}")]
    NoPrice(String),
    #[error("invalid bracket: {0}")]
    InvalidBracket(String),
}

/// Price an entry is sized against: the proposal's own reference when given,
/// otherwise the snapshot mark.
pub fn reference_price(proposal: &ProposedDecision, snapshot: &MarketSnapshot) -> Option<Decimal> {
    proposal
        .suggested_price
        .filter(|p| *p > Decimal::ZERO)
        .or_else(|| snapshot.price(&proposal.symbol))
}

/// Structural checks on a proposal before it is journaled.
///
/// Holds only need sane scores. Closes need a tradable symbol. Entries also
/// need size, leverage, a price and a bracket on the correct side of it.
pub fn validate_proposal(
    proposal: &ProposedDecision,
    snapshot: &MarketSnapshot,
    symbols: &[String],
) -> Result<(), ProposalRejection> {
    score("confidence_score", proposal.confidence_score)?;
    score("risk_score", proposal.risk_score)?;

    let side = match proposal.action {
        TradeAction::Hold => return Ok(()),
        TradeAction::Close => None,
        TradeAction::Long => Some(PositionSide::Long),
        TradeAction::Short => Some(PositionSide::Short),
    };

    if proposal.symbol.trim().is_empty() {
        return Err(ProposalRejection::EmptySymbol);
    }
    if !symbols.iter().any(|s| s == &proposal.symbol) {
        return Err(ProposalRejection::UnknownSymbol(proposal.symbol.clone()));
    }

    let Some(side) = side else {
        return Ok(());
    };

    if proposal.quantity <= Decimal::ZERO {
        return Err(ProposalRejection::NonPositiveQuantity(proposal.quantity));
    }
    if proposal.leverage < Decimal::ONE {
        return Err(ProposalRejection::InvalidLeverage(proposal.leverage));
    }
    let price = reference_price(proposal, snapshot)
        .ok_or_else(|| ProposalRejection::NoPrice(proposal.symbol.clone()))?;

    check_bracket(side, price, proposal.stop_loss, proposal.take_profit)
}

fn score(field: &'static str, value: f64) -> Result<(), ProposalRejection> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProposalRejection::ScoreOutOfRange { field, value })
    }
}

fn check_bracket(
    side: PositionSide,
    price: Decimal,
    stop: Option<Decimal>,
    take: Option<Decimal>,
) -> Result<(), ProposalRejection> {
    let bad = |what: String| Err(ProposalRejection::InvalidBracket(what));
    for (name, level) in [("stop_loss", stop), ("take_profit", take)] {
        if let Some(l) = level {
            if l <= Decimal::ZERO {
                return bad(format!("{name} {l} must be positive"));
            }
        }
    }
    match side {
        PositionSide::Long => {
            if let Some(s) = stop.filter(|s| *s >= price) {
                return bad(format!("long stop_loss {s} must be below {price}"));
            }
            if let Some(t) = take.filter(|t| *t <= price) {
                return bad(format!("long take_profit {t} must be above {price}"));
            }
        }
        PositionSide::Short => {
            if let Some(s) = stop.filter(|s| *s <= price) {
                return bad(format!("short stop_loss {s} must be above {price}"));
            }
            if let Some(t) = take.filter(|t| *t >= price) {
                return bad(format!("short take_profit {t} must be below {price}"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqc_schemas::PoolId;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            pool_id: PoolId::new(),
            as_of: Utc::now(),
            prices: [("BTCUSDT".to_string(), dec!(50000))].into_iter().collect(),
            available_capital: dec!(100000),
            open_positions: vec![],
        }
    }

    fn long() -> ProposedDecision {
        ProposedDecision {
            action: TradeAction::Long,
            symbol: "BTCUSDT".into(),
            quantity: dec!(0.1),
            suggested_price: None,
            stop_loss: Some(dec!(48000)),
            take_profit: Some(dec!(55000)),
            leverage: dec!(3),
            reasoning: "breakout".into(),
            confidence_score: 0.8,
            risk_score: 0.2,
        }
    }

    fn symbols() -> Vec<String> {
        vec!["BTCUSDT".into()]
    }

    #[test]
    fn accepts_well_formed_entry_and_hold() {
        assert_eq!(validate_proposal(&long(), &snapshot(), &symbols()), Ok(()));
        assert_eq!(
            validate_proposal(&ProposedDecision::hold("flat"), &snapshot(), &symbols()),
            Ok(())
        );
    }

    #[test]
    fn rejects_structural_problems() {
        let snap = snapshot();
        let mut p = long();
        p.symbol = "DOGEUSDT".into();
        assert_eq!(
            validate_proposal(&p, &snap, &symbols()),
            Err(ProposalRejection::UnknownSymbol("DOGEUSDT".into()))
        );

        let mut p = long();
        p.quantity = dec!(0);
        assert!(matches!(
            validate_proposal(&p, &snap, &symbols()),
            Err(ProposalRejection::NonPositiveQuantity(_))
        ));

        let mut p = long();
        p.leverage = dec!(0.5);
        assert!(matches!(
            validate_proposal(&p, &snap, &symbols()),
            Err(ProposalRejection::InvalidLeverage(_))
        ));

        let mut p = long();
        p.confidence_score = 1.5;
        assert!(matches!(
            validate_proposal(&p, &snap, &symbols()),
            Err(ProposalRejection::ScoreOutOfRange { field: "confidence_score", .. })
        ));
    }

    #[test]
    fn bracket_must_straddle_reference() {
        let snap = snapshot();
        let mut p = long();
        p.stop_loss = Some(dec!(51000));
        assert!(matches!(
            validate_proposal(&p, &snap, &symbols()),
            Err(ProposalRejection::InvalidBracket(_))
        ));

        let mut p = long();
        p.action = TradeAction::Short;
        p.stop_loss = Some(dec!(52000));
        p.take_profit = Some(dec!(45000));
        assert_eq!(validate_proposal(&p, &snap, &symbols()), Ok(()));
    }

    #[test]
    fn entry_without_any_price_is_rejected() {
        let mut snap = snapshot();
        snap.prices.clear();
        assert_eq!(
            validate_proposal(&long(), &snap, &symbols()),
            Err(ProposalRejection::NoPrice("BTCUSDT".into()))
        );
        let mut p = long();
        p.suggested_price = Some(dec!(50000));
        assert_eq!(validate_proposal(&p, &snap, &symbols()), Ok(()));
    }

    #[test]
    fn close_needs_only_a_traded_symbol() {
        let mut p = long();
        p.action = TradeAction::Close;
        p.quantity = dec!(0);
        assert_eq!(validate_proposal(&p, &snapshot(), &symbols()), Ok(()));
    }
}
