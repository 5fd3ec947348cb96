pub mod oscillators;
pub mod rolling_stats;

pub use oscillators::Oscillators;
pub use rolling_stats::RollingStats;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("insufficient data: {needed} bars needed, {available} available")]
    InsufficientData { needed: usize, available: usize },
    #[error("window must be at least one bar")]
    EmptyWindow,
}

fn require(available: usize, window: usize, lookbehind: usize) -> Result<(), IndicatorError> {
    if window == 0 {
        return Err(IndicatorError::EmptyWindow);
    }
    let needed = window + lookbehind;
    if available < needed {
        return Err(IndicatorError::InsufficientData { needed, available });
    }
    Ok(())
}
