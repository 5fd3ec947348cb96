pub mod cache;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod helpers;
pub mod manager;
pub mod models;
pub mod screener;
pub mod statistics;

pub use config::{OscillatorRule, ScreenerConfig};
pub use gateway::{FetchError, MarketDataGateway};
pub use models::{ScreeningResult, ScreeningSnapshot};
pub use screener::{Screener, SkipReason};
