pub mod evaluator;
pub mod ranking;
pub mod scheduler;

pub use evaluator::{funding_threshold, indicator_snapshot, Evaluator, OscillatorThreshold};
pub use ranking::Ranking;
pub use scheduler::Screener;

use thiserror::Error;

use crate::gateway::FetchError;
use crate::statistics::IndicatorError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error(transparent)]
    InsufficientData(#[from] IndicatorError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no funding rate available")]
    MissingFundingRate,
    #[error("indicator value is not finite")]
    InvalidIndicator,
    #[error("run deadline exceeded")]
    DeadlineExceeded,
    #[error("worker task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScreenError {
    #[error("market trend unavailable for {symbol}: {reason}")]
    TrendUnavailable { symbol: String, reason: String },
}
