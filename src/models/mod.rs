pub mod candle;
pub mod interval;
pub mod snapshot;

pub use candle::{Candle, CandleSeries, SeriesError};
pub use interval::Interval;
pub use snapshot::{
    Conditions, DipLabel, IndicatorSnapshot, MarketTrend, Oscillator, ScreeningResult,
    ScreeningSnapshot,
};
