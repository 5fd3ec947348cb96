use crate::config::{OscillatorRule, ScreenerConfig};
use crate::helpers::percentile;
use crate::models::{
    CandleSeries, Conditions, IndicatorSnapshot, MarketTrend, Oscillator, ScreeningResult,
};
use crate::statistics::{IndicatorError, Oscillators, RollingStats};

use super::SkipReason;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OscillatorThreshold {
    RsiBelow(f64),
    FundingBelow(f64),
}

impl OscillatorThreshold {
    pub fn resolve(rule: &OscillatorRule, funding_rates: &[f64]) -> Self {
        match *rule {
            OscillatorRule::Rsi { threshold } => OscillatorThreshold::RsiBelow(threshold),
            OscillatorRule::FundingRate {
                percentile,
                fallback,
            } => OscillatorThreshold::FundingBelow(funding_threshold(
                funding_rates,
                percentile,
                fallback,
            )),
        }
    }

    pub fn holds(&self, oscillator: Oscillator) -> bool {
        match (self, oscillator) {
            (OscillatorThreshold::RsiBelow(limit), Oscillator::Rsi(rsi)) => rsi < *limit,
            (OscillatorThreshold::FundingBelow(limit), Oscillator::FundingRate(rate)) => {
                rate < *limit
            }
            _ => false,
        }
    }
}

/// Percentile of the non-zero, finite rates, or `fallback` when there are none.
pub fn funding_threshold(rates: &[f64], q: f64, fallback: f64) -> f64 {
    let valid: Vec<f64> = rates
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r != 0.0)
        .collect();
    percentile(&valid, q).unwrap_or(fallback)
}

pub fn indicator_snapshot(
    series: &CandleSeries,
    config: &ScreenerConfig,
    funding_rate: Option<f64>,
) -> Result<IndicatorSnapshot, SkipReason> {
    let candles = series.candles();
    let lookback = config.lookback;

    let baseline = RollingStats::baseline(candles, lookback)?;
    let volume_average = RollingStats::volume_average(candles, lookback)?;
    let atr = RollingStats::average_true_range(candles, lookback)?;
    let last = series.last().ok_or(IndicatorError::InsufficientData {
        needed: lookback,
        available: 0,
    })?;

    let oscillator = match config.oscillator {
        OscillatorRule::Rsi { .. } => Oscillator::Rsi(Oscillators::rsi(candles, config.rsi_window)?),
        OscillatorRule::FundingRate { .. } => {
            Oscillator::FundingRate(funding_rate.ok_or(SkipReason::MissingFundingRate)?)
        }
    };

    let snapshot = IndicatorSnapshot {
        last_close: last.close,
        last_volume: last.volume,
        baseline,
        atr,
        volume_average,
        oscillator,
    };

    if !snapshot.is_finite() {
        return Err(SkipReason::InvalidIndicator);
    }
    Ok(snapshot)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluator {
    body_factor: f64,
    volume_multiplier: f64,
    threshold: OscillatorThreshold,
}

impl Evaluator {
    pub fn new(body_factor: f64, volume_multiplier: f64, threshold: OscillatorThreshold) -> Self {
        Self {
            body_factor,
            volume_multiplier,
            threshold,
        }
    }

    pub fn from_config(config: &ScreenerConfig, threshold: OscillatorThreshold) -> Self {
        Self::new(config.body_factor, config.volume_multiplier, threshold)
    }

    pub fn structure_holds(&self, s: &IndicatorSnapshot) -> bool {
        s.last_close < s.baseline - self.body_factor * s.atr
            && s.last_volume > s.volume_average * self.volume_multiplier
    }

    pub fn evaluate(&self, s: &IndicatorSnapshot, trend: &MarketTrend) -> Conditions {
        Conditions {
            market_trend: trend.below_ema,
            structure: self.structure_holds(s),
            oscillator: self.threshold.holds(s.oscillator),
        }
    }

    pub fn score(
        &self,
        symbol: &str,
        s: &IndicatorSnapshot,
        trend: &MarketTrend,
    ) -> Option<ScreeningResult> {
        ScreeningResult::new(symbol, self.evaluate(s, trend), *s)
    }
}
