use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unknown string value for one of the closed enums below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

/// Closed enums are stored as lowercase text; `as_str`/`parse` are the only mapping.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }

            pub fn parse(s: &str) -> Result<Self, ParseKindError> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(ParseKindError { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

text_enum!(OrderSide, "order side", { Buy => "buy", Sell => "sell" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

text_enum!(PositionSide, "position side", { Long => "long", Short => "short" });

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Venue side that opens a position of this direction.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Venue side that flattens a position of this direction.
    pub fn exit_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

/// Execution venue tag. A = live venue, B = simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BookType {
    A,
    B,
}

text_enum!(BookType, "book type", { A => "A", B => "B" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Entry,
    Exit,
    Hold,
}

text_enum!(DecisionType, "decision type", { Entry => "entry", Exit => "exit", Hold => "hold" });

/// What the strategy collaborator wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Long,
    Short,
    Close,
    Hold,
}

text_enum!(TradeAction, "trade action", {
    Long => "long",
    Short => "short",
    Close => "close",
    Hold => "hold",
});

impl TradeAction {
    pub fn decision_type(&self) -> DecisionType {
        match self {
            TradeAction::Long | TradeAction::Short => DecisionType::Entry,
            TradeAction::Close => DecisionType::Exit,
            TradeAction::Hold => DecisionType::Hold,
        }
    }

    /// Direction opened by an entry action; `None` for close/hold.
    pub fn entry_side(&self) -> Option<PositionSide> {
        match self {
            TradeAction::Long => Some(PositionSide::Long),
            TradeAction::Short => Some(PositionSide::Short),
            TradeAction::Close | TradeAction::Hold => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Filled,
    Partial,
    Failed,
}

text_enum!(TradeStatus, "trade status", {
    Filled => "filled",
    Partial => "partial",
    Failed => "failed",
});

impl TradeStatus {
    /// Derive the status from requested vs filled quantity.
    pub fn from_fill(requested: Decimal, filled: Decimal) -> Self {
        if filled <= Decimal::ZERO {
            TradeStatus::Failed
        } else if filled < requested {
            TradeStatus::Partial
        } else {
            TradeStatus::Filled
        }
    }

    pub fn has_fill(&self) -> bool {
        !matches!(self, TradeStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    Manual,
    RiskLiquidation,
}

text_enum!(CloseReason, "close reason", {
    StopLoss => "stop_loss",
    TakeProfit => "take_profit",
    Manual => "manual",
    RiskLiquidation => "risk_liquidation",
});

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn text_mapping_is_closed() {
        assert_eq!(CloseReason::parse("risk_liquidation").unwrap(), CloseReason::RiskLiquidation);
        assert_eq!(BookType::parse("B").unwrap(), BookType::B);
        let err = TradeStatus::parse("done").unwrap_err();
        assert_eq!(err.kind, "trade status");
    }

    #[test]
    fn serde_uses_snake_case_text() {
        let s = serde_json::to_string(&CloseReason::TakeProfit).unwrap();
        assert_eq!(s, "\"take_profit\"");
        let b: BookType = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(b, BookType::A);
    }

    #[test]
    fn status_from_fill() {
        assert_eq!(TradeStatus::from_fill(dec!(2), dec!(2)), TradeStatus::Filled);
        assert_eq!(TradeStatus::from_fill(dec!(2), dec!(1.5)), TradeStatus::Partial);
        assert_eq!(TradeStatus::from_fill(dec!(2), dec!(0)), TradeStatus::Failed);
    }

    #[test]
    fn sides_are_consistent() {
        assert_eq!(PositionSide::Long.entry_side(), OrderSide::Buy);
        assert_eq!(PositionSide::Short.exit_side(), OrderSide::Buy);
        assert_eq!(PositionSide::Short.sign(), dec!(-1));
        assert_eq!(TradeAction::Close.decision_type(), DecisionType::Exit);
        assert_eq!(TradeAction::Short.entry_side(), Some(PositionSide::Short));
    }
}
