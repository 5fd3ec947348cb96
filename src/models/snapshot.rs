use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::helpers::round_to_decimals;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Oscillator {
    Rsi(f64),
    FundingRate(f64),
}

impl Oscillator {
    pub fn value(&self) -> f64 {
        match self {
            Oscillator::Rsi(v) | Oscillator::FundingRate(v) => *v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub last_close: f64,
    pub last_volume: f64,
    pub baseline: f64,
    pub atr: f64,
    pub volume_average: f64,
    pub oscillator: Oscillator,
}

impl IndicatorSnapshot {
    pub fn is_finite(&self) -> bool {
        [
            self.last_close,
            self.last_volume,
            self.baseline,
            self.atr,
            self.volume_average,
            self.oscillator.value(),
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrend {
    pub reference: String,
    pub close: f64,
    pub ema: f64,
    pub below_ema: bool,
}

impl MarketTrend {
    pub fn new(reference: impl Into<String>, close: f64, ema: f64) -> Self {
        Self {
            reference: reference.into(),
            close,
            ema,
            below_ema: close < ema,
        }
    }

    pub fn unavailable(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            close: 0.0,
            ema: 0.0,
            below_ema: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    pub market_trend: bool,
    pub structure: bool,
    pub oscillator: bool,
}

impl Conditions {
    pub fn score(&self) -> u8 {
        [self.market_trend, self.structure, self.oscillator]
            .iter()
            .filter(|met| **met)
            .count() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DipLabel {
    #[serde(rename = "full pre-dip")]
    FullPreDip,
    #[serde(rename = "near-dip")]
    NearDip,
    #[serde(rename = "warm-dip")]
    WarmDip,
}

impl DipLabel {
    pub fn from_score(score: u8) -> Option<Self> {
        match score {
            3 => Some(DipLabel::FullPreDip),
            2 => Some(DipLabel::NearDip),
            1 => Some(DipLabel::WarmDip),
            _ => None,
        }
    }
}

impl fmt::Display for DipLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DipLabel::FullPreDip => "full pre-dip",
            DipLabel::NearDip => "near-dip",
            DipLabel::WarmDip => "warm-dip",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub symbol: String,
    pub conditions: Conditions,
    pub score: u8,
    pub label: DipLabel,
    pub oscillator_display: f64,
    pub indicators: IndicatorSnapshot,
}

impl ScreeningResult {
    pub fn new(
        symbol: impl Into<String>,
        conditions: Conditions,
        indicators: IndicatorSnapshot,
    ) -> Option<Self> {
        let score = conditions.score();
        let label = DipLabel::from_score(score)?;
        let oscillator_display = match indicators.oscillator {
            Oscillator::Rsi(rsi) => round_to_decimals(rsi, 2),
            Oscillator::FundingRate(rate) => rate,
        };

        Some(Self {
            symbol: symbol.into(),
            conditions,
            score,
            label,
            oscillator_display,
            indicators,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningSnapshot {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub trend: MarketTrend,
    pub results: Vec<ScreeningResult>,
    pub scanned: usize,
    pub skipped: usize,
    pub degraded: bool,
}

impl ScreeningSnapshot {
    pub fn degraded(reference: impl Into<String>, scanned: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            trend: MarketTrend::unavailable(reference),
            results: Vec::new(),
            scanned,
            skipped: 0,
            degraded: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn by_score(&self, score: u8) -> impl Iterator<Item = &ScreeningResult> {
        self.results.iter().filter(move |r| r.score == score)
    }

    pub fn top_score(&self) -> Option<u8> {
        self.results.first().map(|r| r.score)
    }

    pub fn headline(&self) -> &'static str {
        match self.top_score() {
            Some(3) => "full pre-dip detected",
            Some(2) => "near-dip conditions detected",
            Some(_) => "only warm dips at the moment",
            None => "no dip conditions met",
        }
    }
}
