pub mod binance;
pub mod types;

pub use binance::{BaseUrl, BinanceGateway};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CandleSeries, Interval};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("symbol not found: {0}")]
    NotFound(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::NotFound(_))
    }
}

#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<CandleSeries, FetchError>;

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64, FetchError>;
}

#[async_trait]
impl<G: MarketDataGateway + ?Sized> MarketDataGateway for std::sync::Arc<G> {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        (**self).fetch_candles(symbol, interval, limit).await
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64, FetchError> {
        (**self).fetch_funding_rate(symbol).await
    }
}
