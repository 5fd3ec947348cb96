use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{OscillatorRule, ScreenerConfig};
use crate::manager::RetryPolicy;
use crate::models::Interval;

#[derive(Debug, Parser)]
#[command(author, version, about = "Screens exchange symbols for pre-dip conditions", long_about = None)]
pub struct Args {
    /// File with one symbol per line
    #[arg(short, long, default_value = "Tickers.csv")]
    pub symbols_file: PathBuf,

    #[arg(long, default_value_t = 96)]
    pub lookback: usize,

    #[arg(long, default_value = "15m")]
    pub pair_interval: Interval,

    #[arg(long, default_value = "BTCUSDT")]
    pub reference: String,

    #[arg(long, default_value = "4h")]
    pub reference_interval: Interval,

    #[arg(long, default_value_t = 0.3)]
    pub body_factor: f64,

    #[arg(long, default_value_t = 2.5)]
    pub volume_multiplier: f64,

    #[arg(long, default_value_t = 14)]
    pub rsi_window: usize,

    #[arg(long, default_value_t = 30.0)]
    pub rsi_threshold: f64,

    /// Use funding rates instead of RSI for the oscillator condition
    #[arg(long)]
    pub funding: bool,

    #[arg(short, long, default_value_t = 16)]
    pub concurrency: usize,

    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub timeout: Duration,

    #[arg(long, default_value = "2m", value_parser = parse_duration)]
    pub deadline: Duration,

    /// Rescan on this period instead of exiting after one pass
    #[arg(short, long, value_parser = parse_duration)]
    pub watch: Option<Duration>,

    #[arg(long)]
    pub pretty: bool,
}

impl Args {
    pub fn to_config(&self) -> ScreenerConfig {
        let oscillator = if self.funding {
            OscillatorRule::funding_default()
        } else {
            OscillatorRule::Rsi {
                threshold: self.rsi_threshold,
            }
        };

        ScreenerConfig {
            lookback: self.lookback,
            pair_interval: self.pair_interval,
            reference_symbol: self.reference.to_uppercase(),
            reference_interval: self.reference_interval,
            body_factor: self.body_factor,
            volume_multiplier: self.volume_multiplier,
            rsi_window: self.rsi_window,
            oscillator,
            concurrency: self.concurrency,
            retry: RetryPolicy {
                max_retries: self.retries,
                timeout_ms: self.timeout.as_millis() as u64,
                ..Default::default()
            },
            run_deadline: self.deadline,
            ..Default::default()
        }
    }
}

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let (digits, unit_ms) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1_000)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60_000)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600_000)
    } else {
        return Err("Invalid duration format. Use formats like 500ms, 1s, 3m, or 1h.".into());
    };

    let num = u64::from_str(digits).map_err(|e| e.to_string())?;
    if num == 0 {
        return Err("Duration must be greater than zero.".into());
    }
    let millis = num
        .checked_mul(unit_ms)
        .ok_or_else(|| format!("Duration '{s}' is too large."))?;
    Ok(Duration::from_millis(millis))
}
