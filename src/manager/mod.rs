use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::gateway::{FetchError, MarketDataGateway};
use crate::models::{CandleSeries, Interval};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 250,
            timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self
            .retry_delay_ms
            .saturating_mul(1u64 << retry.saturating_sub(1).min(16));
        let jitter = if self.retry_delay_ms >= 2 {
            rand::rng().random_range(0..=self.retry_delay_ms / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub struct FetchManager<G> {
    gateway: G,
    policy: RetryPolicy,
}

impl<G: MarketDataGateway> FetchManager<G> {
    pub fn new(gateway: G, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retries = 0;

        loop {
            let result = match tokio::time::timeout(self.policy.timeout(), attempt()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout),
            };

            match result {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{what} succeeded after {retries} retries");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() || retries >= self.policy.max_retries => {
                    return Err(e);
                }
                Err(e) => {
                    retries += 1;
                    let delay = self.policy.backoff(retries);
                    warn!(
                        "{what} failed: {e}. Retry {retries}/{} in {}ms",
                        self.policy.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<G: MarketDataGateway> MarketDataGateway for FetchManager<G> {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        let what = format!("[{symbol}] candles {interval}x{limit}");
        self.with_retries(&what, || self.gateway.fetch_candles(symbol, interval, limit))
            .await
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64, FetchError> {
        let what = format!("[{symbol}] funding rate");
        self.with_retries(&what, || self.gateway.fetch_funding_rate(symbol))
            .await
    }
}
