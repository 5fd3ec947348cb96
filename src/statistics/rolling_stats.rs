use crate::models::Candle;

use super::{require, IndicatorError};

pub struct RollingStats;

impl RollingStats {
    pub fn baseline(candles: &[Candle], window: usize) -> Result<f64, IndicatorError> {
        require(candles.len(), window, 0)?;
        let tail = &candles[candles.len() - window..];
        Ok(tail.iter().map(|c| c.close).sum::<f64>() / window as f64)
    }

    pub fn volume_average(candles: &[Candle], window: usize) -> Result<f64, IndicatorError> {
        require(candles.len(), window, 0)?;
        let tail = &candles[candles.len() - window..];
        Ok(tail.iter().map(|c| c.volume).sum::<f64>() / window as f64)
    }

    pub fn true_range(previous_close: f64, candle: &Candle) -> f64 {
        (candle.high - candle.low)
            .max((candle.high - previous_close).abs())
            .max((candle.low - previous_close).abs())
    }

    /// Average true range with Wilder smoothing over `window` bars.
    ///
    /// The first bar has no previous close, so its range is `high - low`.
    /// The first `window` ranges seed the average and every later bar is
    /// folded in as `(atr * (window - 1) + tr) / window`.
    pub fn average_true_range(candles: &[Candle], window: usize) -> Result<f64, IndicatorError> {
        require(candles.len(), window, 0)?;

        let first = candles[0].high - candles[0].low;
        let ranges: Vec<f64> = std::iter::once(first)
            .chain(
                candles
                    .windows(2)
                    .map(|w| Self::true_range(w[0].close, &w[1])),
            )
            .collect();

        let seed = ranges[..window].iter().sum::<f64>() / window as f64;
        let period = window as f64;
        let atr = ranges[window..]
            .iter()
            .fold(seed, |atr, tr| (atr * (period - 1.0) + tr) / period);

        Ok(atr.max(0.0))
    }
}
