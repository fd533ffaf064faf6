use std::sync::{Arc, PoisonError, RwLock};

use aqc_schemas::PriceMap;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("price feed unavailable: {0}")]
    Unavailable(String),
}

/// Source of current marks.
///
/// Symbols the feed has no price for are omitted from the result; callers
/// decide whether a missing mark matters.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest_prices(&self, symbols: &[String]) -> Result<PriceMap, FeedError>;
}

#[async_trait]
impl<T: PriceFeed + ?Sized> PriceFeed for Arc<T> {
    async fn latest_prices(&self, symbols: &[String]) -> Result<PriceMap, FeedError> {
        (**self).latest_prices(symbols).await
    }
}

/// In-memory feed. Clones share the same price table.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    prices: Arc<RwLock<PriceMap>>,
}

impl StaticPriceFeed {
    pub fn new(prices: PriceMap) -> Self {
        Self {
            prices: Arc::new(RwLock::new(prices)),
        }
    }

    pub fn set(&self, symbol: impl Into<String>, price: Decimal) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.into(), price);
    }

    pub fn remove(&self, symbol: &str) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(symbol);
    }

    pub fn snapshot(&self) -> PriceMap {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn latest_prices(&self, symbols: &[String]) -> Result<PriceMap, FeedError> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn returns_only_requested_known_symbols() {
        let feed = StaticPriceFeed::default();
        feed.set("BTCUSDT", dec!(50000));
        feed.set("ETHUSDT", dec!(3000));

        let got = feed
            .latest_prices(&["BTCUSDT".to_string(), "SOLUSDT".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["BTCUSDT"], dec!(50000));

        let shared = feed.clone();
        shared.set("BTCUSDT", dec!(51000));
        shared.remove("ETHUSDT");
        assert_eq!(feed.snapshot().get("BTCUSDT"), Some(&dec!(51000)));
        assert!(!feed.snapshot().contains_key("ETHUSDT"));
    }
}
