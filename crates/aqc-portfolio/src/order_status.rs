//! Investment order lifecycle.
//!
//! ```text
//!   Pending ──► Active ◄──► Paused
//!                 │           │
//!                 ├──► Redeeming ──► Redeemed (term.)
//!                 │       │
//!                 │       └──► Active   (payout could not be funded)
//!                 └──► Liquidated (term.)  (also from Paused / Pending)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Active,
    Paused,
    Redeeming,
    /// **Terminal.**
    Redeemed,
    /// **Terminal.**
    Liquidated,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redeemed | Self::Liquidated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Redeeming => "redeeming",
            Self::Redeemed => "redeemed",
            Self::Liquidated => "liquidated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "paused" => Self::Paused,
            "redeeming" => Self::Redeeming,
            "redeemed" => Self::Redeemed,
            "liquidated" => Self::Liquidated,
            _ => return None,
        })
    }

    /// Apply a transition; illegal moves are rejected without changing state.
    pub fn transition(self, to: OrderStatus) -> Result<OrderStatus, OrderTransitionError> {
        use OrderStatus::*;
        let legal = matches!(
            (self, to),
            (Pending, Active)
                | (Pending, Liquidated)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Redeeming)
                | (Paused, Redeeming)
                | (Redeeming, Redeemed)
                | (Redeeming, Active)
                | (Active, Liquidated)
                | (Paused, Liquidated)
        );
        if legal {
            Ok(to)
        } else {
            Err(OrderTransitionError { from: self, to })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal order transition: {from:?} -> {to:?}")]
pub struct OrderTransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn terminal_states_accept_nothing() {
        for to in [Pending, Active, Paused, Redeeming, Redeemed, Liquidated] {
            assert!(Redeemed.transition(to).is_err());
            assert!(Liquidated.transition(to).is_err());
        }
    }

    #[test]
    fn redemption_path() {
        let s = Active.transition(Redeeming).unwrap();
        assert_eq!(s.transition(Redeemed).unwrap(), Redeemed);
        assert!(Pending.transition(Redeeming).is_err());
    }

    #[test]
    fn text_round_trip() {
        for s in [Pending, Active, Paused, Redeeming, Redeemed, Liquidated] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("closed"), None);
    }
}
