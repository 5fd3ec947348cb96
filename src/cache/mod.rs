pub mod refresh;

pub use refresh::RefreshCache;

use async_trait::async_trait;
use std::time::Duration;

use crate::gateway::{FetchError, MarketDataGateway};
use crate::models::{CandleSeries, Interval};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: Interval,
    pub limit: usize,
}

pub struct CachedGateway<G> {
    inner: G,
    candles: RefreshCache<CandleKey, CandleSeries>,
    funding: RefreshCache<String, f64>,
}

impl<G: MarketDataGateway> CachedGateway<G> {
    pub fn new(inner: G, ttl: Duration) -> Self {
        Self {
            inner,
            candles: RefreshCache::new(ttl),
            funding: RefreshCache::new(ttl),
        }
    }

    pub fn clear_expired(&self) {
        self.candles.clear_expired();
        self.funding.clear_expired();
    }
}

#[async_trait]
impl<G: MarketDataGateway> MarketDataGateway for CachedGateway<G> {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        let key = CandleKey {
            symbol: symbol.to_string(),
            interval,
            limit,
        };
        self.candles
            .get_or_fetch(key, || self.inner.fetch_candles(symbol, interval, limit))
            .await
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64, FetchError> {
        self.funding
            .get_or_fetch(symbol.to_string(), || self.inner.fetch_funding_rate(symbol))
            .await
    }
}
