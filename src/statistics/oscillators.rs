use crate::models::Candle;

use super::{require, IndicatorError};

pub struct Oscillators;

impl Oscillators {
    /// Wilder RSI over close-to-close changes.
    ///
    /// Needs `window + 1` bars. Saturates at 100 when the average loss is
    /// zero, and never returns NaN.
    pub fn rsi(candles: &[Candle], window: usize) -> Result<f64, IndicatorError> {
        require(candles.len(), window, 1)?;

        let changes: Vec<f64> = candles.windows(2).map(|w| w[1].close - w[0].close).collect();
        let period = window as f64;

        let mut avg_gain = changes[..window].iter().map(|c| c.max(0.0)).sum::<f64>() / period;
        let mut avg_loss = changes[..window].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period;

        for change in &changes[window..] {
            avg_gain = (avg_gain * (period - 1.0) + change.max(0.0)) / period;
            avg_loss = (avg_loss * (period - 1.0) + (-change).max(0.0)) / period;
        }

        if avg_loss <= 0.0 {
            return Ok(100.0);
        }

        let rsi = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        if rsi.is_finite() {
            Ok(rsi.clamp(0.0, 100.0))
        } else {
            Ok(100.0)
        }
    }

    pub fn ema(candles: &[Candle], span: usize) -> Result<f64, IndicatorError> {
        require(candles.len(), span, 0)?;

        let alpha = 2.0 / (span as f64 + 1.0);
        let mut closes = candles.iter().map(|c| c.close);
        let seed = closes.next().unwrap_or_default();

        Ok(closes.fold(seed, |ema, close| alpha * close + (1.0 - alpha) * ema))
    }
}
