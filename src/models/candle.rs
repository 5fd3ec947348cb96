use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    fn is_well_formed(&self) -> bool {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        values.iter().all(|v| v.is_finite())
            && self.volume >= 0.0
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index} is malformed: {candle:?}")]
    MalformedBar { index: usize, candle: Candle },
    #[error("bar {index} at {timestamp} does not follow {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: u64,
        previous: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    symbol: String,
    interval: Interval,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        candles: Vec<Candle>,
    ) -> Result<Self, SeriesError> {
        for (index, candle) in candles.iter().enumerate() {
            if !candle.is_well_formed() {
                return Err(SeriesError::MalformedBar {
                    index,
                    candle: *candle,
                });
            }
        }

        if let Some(index) = candles
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(SeriesError::OutOfOrder {
                index: index + 1,
                timestamp: candles[index + 1].timestamp,
                previous: candles[index].timestamp,
            });
        }

        Ok(Self {
            symbol: symbol.into(),
            interval,
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}
