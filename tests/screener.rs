use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use predip::config::OscillatorRule;
use predip::manager::RetryPolicy;
use predip::models::{Candle, CandleSeries, DipLabel, Interval, Oscillator};
use predip::{FetchError, MarketDataGateway, Screener, ScreenerConfig};

fn declining(n: usize, step_ms: u64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 100.0 - i as f64 * 0.5;
            Candle {
                timestamp: i as u64 * step_ms,
                open: close + 0.25,
                high: close + 0.5,
                low: close - 0.25,
                close,
                volume: if i + 1 == n { 1_000.0 } else { 100.0 },
            }
        })
        .collect()
}

fn flat(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| Candle {
            timestamp: i as u64 * 900_000,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 100.0,
        })
        .collect()
}

#[derive(Default)]
struct MockGateway {
    candles: HashMap<String, Result<Vec<Candle>, FetchError>>,
    funding: HashMap<String, f64>,
    delays: HashMap<String, Duration>,
    candle_calls: AtomicUsize,
    funding_calls: AtomicUsize,
    calls_by_symbol: std::sync::Mutex<HashMap<String, usize>>,
}

impl MockGateway {
    fn with_market(reference: Vec<Candle>) -> Self {
        let mut gateway = Self::default();
        gateway.candles.insert("BTCUSDT".to_string(), Ok(reference));
        gateway
    }

    fn pair(mut self, symbol: &str, candles: Result<Vec<Candle>, FetchError>) -> Self {
        self.candles.insert(symbol.to_string(), candles);
        self
    }

    fn calls_for(&self, symbol: &str) -> usize {
        let calls = self.calls_by_symbol.lock().unwrap();
        calls.get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataGateway for MockGateway {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_symbol
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default() += 1;

        if let Some(delay) = self.delays.get(symbol) {
            tokio::time::sleep(*delay).await;
        }

        let candles = match self.candles.get(symbol) {
            Some(Ok(candles)) => candles.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => return Err(FetchError::NotFound(symbol.to_string())),
        };
        let tail = candles[candles.len().saturating_sub(limit)..].to_vec();
        CandleSeries::new(symbol, interval, tail).map_err(|e| FetchError::Transport(e.to_string()))
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64, FetchError> {
        self.funding_calls.fetch_add(1, Ordering::SeqCst);
        self.funding
            .get(symbol)
            .copied()
            .ok_or_else(|| FetchError::NotFound(symbol.to_string()))
    }
}

fn config() -> ScreenerConfig {
    ScreenerConfig {
        retry: RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 10,
            timeout_ms: 10_000,
        },
        ..Default::default()
    }
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn bearish_market() -> MockGateway {
    MockGateway::with_market(declining(30, 4 * 3_600_000))
}

#[tokio::test(start_paused = true)]
async fn test_full_scan_scores_and_skips() {
    let gateway = bearish_market()
        .pair("SOLUSDT", Ok(declining(98, 900_000)))
        .pair("XRPUSDT", Ok(flat(98)))
        .pair("NEWUSDT", Ok(flat(50)))
        .pair("GONEUSDT", Err(FetchError::NotFound("GONEUSDT".to_string())));
    let gateway = Arc::new(gateway);
    let screener = Screener::new(config(), gateway.clone());

    let snapshot = screener
        .run(&symbols(&["XRPUSDT", "SOLUSDT", "NEWUSDT", "GONEUSDT"]))
        .await;

    assert!(snapshot.trend.below_ema);
    assert_eq!(snapshot.trend.reference, "BTCUSDT");
    assert!(!snapshot.degraded);
    assert_eq!(snapshot.scanned, 4);
    assert_eq!(snapshot.skipped, 2);

    let ranked: Vec<(&str, u8)> = snapshot
        .results
        .iter()
        .map(|r| (r.symbol.as_str(), r.score))
        .collect();
    assert_eq!(ranked, vec![("SOLUSDT", 3), ("XRPUSDT", 1)]);

    let sol = &snapshot.results[0];
    assert_eq!(sol.label, DipLabel::FullPreDip);
    assert_eq!(sol.indicators.oscillator, Oscillator::Rsi(0.0));
    assert_eq!(sol.oscillator_display, 0.0);
    assert_eq!(snapshot.results[1].label, DipLabel::WarmDip);
    assert_eq!(snapshot.headline(), "full pre-dip detected");

    // NotFound is never retried
    assert_eq!(gateway.calls_for("GONEUSDT"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exactly_lookback_bars_is_scored() {
    let gateway = bearish_market()
        .pair("FRESHUSDT", Ok(declining(96, 900_000)))
        .pair("SHORTUSDT", Ok(declining(95, 900_000)));
    let screener = Screener::new(config(), gateway);

    let snapshot = screener.run(&symbols(&["FRESHUSDT", "SHORTUSDT"])).await;

    assert_eq!(snapshot.skipped, 1);
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].symbol, "FRESHUSDT");
    assert_eq!(snapshot.results[0].score, 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let gateway = Arc::new(
        bearish_market()
            .pair("SOLUSDT", Ok(declining(98, 900_000)))
            .pair("FLAKYUSDT", Err(FetchError::Transport("reset".to_string()))),
    );
    let screener = Screener::new(config(), gateway.clone());

    let snapshot = screener.run(&symbols(&["SOLUSDT", "FLAKYUSDT"])).await;

    assert_eq!(gateway.calls_for("FLAKYUSDT"), 3);
    assert_eq!(snapshot.skipped, 1);
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].symbol, "SOLUSDT");
}

#[tokio::test(start_paused = true)]
async fn test_missing_reference_degrades_run() {
    let mut gateway = MockGateway::default().pair("SOLUSDT", Ok(declining(98, 900_000)));
    gateway.candles.insert(
        "BTCUSDT".to_string(),
        Err(FetchError::NotFound("BTCUSDT".to_string())),
    );
    let gateway = Arc::new(gateway);
    let screener = Screener::new(config(), gateway.clone());

    let snapshot = screener.screen(&symbols(&["SOLUSDT"])).await;

    assert!(snapshot.degraded);
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.trend.close, 0.0);
    assert_eq!(snapshot.trend.ema, 0.0);
    assert!(!snapshot.trend.below_ema);
    assert_eq!(snapshot.headline(), "no dip conditions met");
    assert_eq!(gateway.calls_for("SOLUSDT"), 0);

    // degraded snapshots are not memoized
    screener.screen(&symbols(&["SOLUSDT"])).await;
    assert_eq!(gateway.calls_for("BTCUSDT"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_short_reference_degrades_run() {
    let gateway = MockGateway::with_market(declining(10, 4 * 3_600_000))
        .pair("SOLUSDT", Ok(declining(98, 900_000)));
    let screener = Screener::new(config(), gateway);

    let snapshot = screener.run(&symbols(&["SOLUSDT"])).await;
    assert!(snapshot.degraded);
    assert!(snapshot.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bullish_market_drops_trend_condition() {
    let mut rising = declining(30, 4 * 3_600_000);
    rising.iter_mut().enumerate().for_each(|(i, c)| {
        let close = 100.0 + i as f64;
        *c = Candle {
            timestamp: c.timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        };
    });
    let gateway = MockGateway::with_market(rising)
        .pair("SOLUSDT", Ok(declining(98, 900_000)))
        .pair("XRPUSDT", Ok(flat(98)));
    let screener = Screener::new(config(), gateway);

    let snapshot = screener.run(&symbols(&["SOLUSDT", "XRPUSDT"])).await;

    assert!(!snapshot.trend.below_ema);
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].score, 2);
    assert_eq!(snapshot.headline(), "near-dip conditions detected");
}

#[tokio::test(start_paused = true)]
async fn test_screen_reuses_snapshot_within_ttl() {
    let gateway = Arc::new(
        bearish_market()
            .pair("SOLUSDT", Ok(declining(98, 900_000)))
            .pair("XRPUSDT", Ok(flat(98))),
    );
    let screener = Screener::new(config(), gateway.clone());
    let universe = symbols(&["solusdt", "XRPUSDT", " SOLUSDT"]);

    let first = screener.screen(&universe).await;
    let calls = gateway.candle_calls.load(Ordering::SeqCst);
    assert_eq!(calls, 3);
    assert_eq!(first.scanned, 2);

    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    let second = screener.screen(&symbols(&["SOLUSDT", "XRPUSDT"])).await;
    assert_eq!(second.id, first.id);
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), calls);

    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    screener.prune();
    let third = screener.screen(&universe).await;
    assert_ne!(third.id, first.id);
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), calls * 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_screens_share_one_run() {
    let gateway = Arc::new(bearish_market().pair("SOLUSDT", Ok(declining(98, 900_000))));
    let screener = Arc::new(Screener::new(config(), gateway.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let screener = screener.clone();
            tokio::spawn(async move { screener.screen(&symbols(&["SOLUSDT"])).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_funding_variant_uses_run_percentile() {
    let mut gateway = bearish_market()
        .pair("AUSDT", Ok(flat(98)))
        .pair("BUSDT", Ok(flat(98)))
        .pair("CUSDT", Ok(flat(98)))
        .pair("DUSDT", Ok(flat(98)))
        .pair("EUSDT", Ok(flat(98)));
    gateway.funding = [
        ("AUSDT", -0.0005),
        ("BUSDT", 0.0001),
        ("CUSDT", 0.0002),
        ("DUSDT", -0.0001),
    ]
    .into_iter()
    .map(|(s, r)| (s.to_string(), r))
    .collect();
    let gateway = Arc::new(gateway);

    let config = ScreenerConfig {
        oscillator: OscillatorRule::funding_default(),
        ..config()
    };
    let screener = Screener::new(config, gateway.clone());

    let snapshot = screener
        .run(&symbols(&["AUSDT", "BUSDT", "CUSDT", "DUSDT", "EUSDT"]))
        .await;

    // threshold is the 25th percentile of the four rates: -0.0002
    assert_eq!(gateway.funding_calls.load(Ordering::SeqCst), 5);
    assert_eq!(snapshot.skipped, 1);
    assert_eq!(gateway.calls_for("EUSDT"), 0);

    let ranked: Vec<(&str, u8)> = snapshot
        .results
        .iter()
        .map(|r| (r.symbol.as_str(), r.score))
        .collect();
    assert_eq!(
        ranked,
        vec![("AUSDT", 2), ("BUSDT", 1), ("CUSDT", 1), ("DUSDT", 1)]
    );
    assert_eq!(
        snapshot.results[0].indicators.oscillator,
        Oscillator::FundingRate(-0.0005)
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_deadline_skips_slow_symbols() {
    let mut gateway = bearish_market()
        .pair("SOLUSDT", Ok(declining(98, 900_000)))
        .pair("SLOWUSDT", Ok(declining(98, 900_000)));
    gateway
        .delays
        .insert("SLOWUSDT".to_string(), Duration::from_secs(600));

    let config = ScreenerConfig {
        run_deadline: Duration::from_secs(60),
        retry: RetryPolicy {
            max_retries: 0,
            retry_delay_ms: 10,
            timeout_ms: 3_600_000,
        },
        ..Default::default()
    };
    let screener = Screener::new(config, gateway);

    let snapshot = screener.run(&symbols(&["SLOWUSDT", "SOLUSDT"])).await;

    assert_eq!(snapshot.scanned, 2);
    assert_eq!(snapshot.skipped, 1);
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.results[0].symbol, "SOLUSDT");
}
