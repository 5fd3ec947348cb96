use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::manager::RetryPolicy;
use crate::models::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum OscillatorRule {
    Rsi { threshold: f64 },
    FundingRate { percentile: f64, fallback: f64 },
}

impl Default for OscillatorRule {
    fn default() -> Self {
        OscillatorRule::Rsi { threshold: 30.0 }
    }
}

impl OscillatorRule {
    pub fn funding_default() -> Self {
        OscillatorRule::FundingRate {
            percentile: 25.0,
            fallback: -0.0001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerConfig {
    pub lookback: usize,
    pub pair_interval: Interval,
    pub reference_symbol: String,
    pub reference_interval: Interval,
    pub reference_limit: usize,
    pub trend_ema_span: usize,
    pub body_factor: f64,
    pub volume_multiplier: f64,
    pub rsi_window: usize,
    pub oscillator: OscillatorRule,
    pub candle_ttl: Duration,
    pub snapshot_ttl: Duration,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub run_deadline: Duration,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            lookback: 96,
            pair_interval: Interval::M15,
            reference_symbol: "BTCUSDT".to_string(),
            reference_interval: Interval::H4,
            reference_limit: 30,
            trend_ema_span: 21,
            body_factor: 0.3,
            volume_multiplier: 2.5,
            rsi_window: 14,
            oscillator: OscillatorRule::default(),
            candle_ttl: Duration::from_secs(5 * 60),
            snapshot_ttl: Duration::from_secs(15 * 60),
            concurrency: 16,
            retry: RetryPolicy::default(),
            run_deadline: Duration::from_secs(120),
        }
    }
}

impl ScreenerConfig {
    pub fn pair_limit(&self) -> usize {
        self.lookback + 2
    }

    pub fn concurrency_cap(&self) -> usize {
        self.concurrency.max(1)
    }
}
