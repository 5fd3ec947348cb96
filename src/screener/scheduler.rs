use futures::future::{join_all, BoxFuture};
use log::{debug, error, info, warn};
use rust_fsm::*;
use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::limit::ConcurrencyLimit;
use tower::Service;

use super::evaluator::{indicator_snapshot, Evaluator, OscillatorThreshold};
use super::ranking::Ranking;
use super::{ScreenError, SkipReason};
use crate::cache::{CachedGateway, RefreshCache};
use crate::config::{OscillatorRule, ScreenerConfig};
use crate::gateway::MarketDataGateway;
use crate::helpers::dedup_symbols;
use crate::manager::FetchManager;
use crate::models::{IndicatorSnapshot, MarketTrend, ScreeningSnapshot};
use crate::statistics::Oscillators;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    screening_run(Idle)

    Idle(Start) => FetchingTrend,
    FetchingTrend => {
        TrendReady => FetchingSymbols,
        TrendFailed => Degraded [PublishEmpty]
    },
    FetchingSymbols(SymbolsCollected) => Evaluating,
    Evaluating(Ranked) => Done [Publish]
}

type GatewayStack = CachedGateway<FetchManager<Arc<dyn MarketDataGateway>>>;
type FundingRates = HashMap<String, Result<f64, SkipReason>>;

fn advance(
    machine: &mut screening_run::StateMachine,
    input: screening_run::Input,
) -> Option<screening_run::Output> {
    let from = *machine.state();
    match machine.consume(&input) {
        Ok(output) => {
            debug!("screening run {from:?} --{input:?}--> {:?}", machine.state());
            output
        }
        Err(_) => {
            warn!("screening run cannot take {input:?} in {from:?}");
            None
        }
    }
}

struct DegradedRun(Arc<ScreeningSnapshot>);

pub struct Screener {
    config: Arc<ScreenerConfig>,
    gateway: Arc<GatewayStack>,
    snapshots: RefreshCache<Vec<String>, Arc<ScreeningSnapshot>>,
}

impl Screener {
    pub fn new<G: MarketDataGateway + 'static>(config: ScreenerConfig, gateway: G) -> Self {
        let upstream: Arc<dyn MarketDataGateway> = Arc::new(gateway);
        let managed = FetchManager::new(upstream, config.retry.clone());
        let cached = CachedGateway::new(managed, config.candle_ttl);

        Self {
            snapshots: RefreshCache::new(config.snapshot_ttl),
            gateway: Arc::new(cached),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn prune(&self) {
        self.gateway.clear_expired();
        self.snapshots.clear_expired();
    }

    pub async fn screen(&self, symbols: &[String]) -> Arc<ScreeningSnapshot> {
        let universe = dedup_symbols(symbols);

        let outcome = self
            .snapshots
            .get_or_fetch(universe.clone(), || async {
                let snapshot = Arc::new(self.run(&universe).await);
                if snapshot.degraded {
                    Err(DegradedRun(snapshot))
                } else {
                    Ok(snapshot)
                }
            })
            .await;

        match outcome {
            Ok(snapshot) | Err(DegradedRun(snapshot)) => snapshot,
        }
    }

    pub async fn run(&self, symbols: &[String]) -> ScreeningSnapshot {
        self.prune();
        let symbols = dedup_symbols(symbols);
        let started = Instant::now();
        let deadline = started + self.config.run_deadline;
        let mut machine = screening_run::StateMachine::new();

        advance(&mut machine, screening_run::Input::Start);
        let trend = match tokio::time::timeout_at(deadline, self.market_trend()).await {
            Ok(Ok(trend)) => trend,
            Ok(Err(e)) => return self.degrade(&mut machine, e, symbols.len()),
            Err(_) => {
                let e = ScreenError::TrendUnavailable {
                    symbol: self.config.reference_symbol.clone(),
                    reason: "run deadline exceeded".to_string(),
                };
                return self.degrade(&mut machine, e, symbols.len());
            }
        };
        info!(
            "{} close {:.2} vs EMA{} {:.2}: {}",
            trend.reference,
            trend.close,
            self.config.trend_ema_span,
            trend.ema,
            if trend.below_ema { "below" } else { "above" }
        );
        advance(&mut machine, screening_run::Input::TrendReady);

        let funding = match self.config.oscillator {
            OscillatorRule::FundingRate { .. } => {
                Some(Arc::new(self.collect_funding(&symbols, deadline).await))
            }
            OscillatorRule::Rsi { .. } => None,
        };
        let rates: Vec<f64> = funding
            .iter()
            .flat_map(|rates| rates.values())
            .filter_map(|rate| rate.as_ref().ok().copied())
            .collect();
        let threshold = OscillatorThreshold::resolve(&self.config.oscillator, &rates);
        debug!("oscillator threshold for this run: {threshold:?}");

        let task = SymbolTask {
            gateway: self.gateway.clone(),
            config: self.config.clone(),
            funding,
        };
        let outcomes = fan_out(task, &symbols, self.config.concurrency_cap(), deadline).await;
        advance(&mut machine, screening_run::Input::SymbolsCollected);

        let evaluator = Evaluator::from_config(&self.config, threshold);
        let mut results = Vec::new();
        let mut skipped = 0;
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(indicators) => match evaluator.score(&symbol, &indicators, &trend) {
                    Some(result) => results.push(result),
                    None => debug!("[{symbol}] no condition met"),
                },
                Err(reason) => {
                    skipped += 1;
                    warn!("[{symbol}] skipped: {reason}");
                }
            }
        }

        let snapshot = Ranking::publish(trend, results, symbols.len(), skipped);
        if let Some(output) = advance(&mut machine, screening_run::Input::Ranked) {
            info!(
                "{output:?}: {} of {} symbols flagged, {} skipped in {:.1}s ({})",
                snapshot.results.len(),
                snapshot.scanned,
                snapshot.skipped,
                started.elapsed().as_secs_f64(),
                snapshot.headline()
            );
        }
        snapshot
    }

    pub async fn market_trend(&self) -> Result<MarketTrend, ScreenError> {
        let reference = &self.config.reference_symbol;
        let unavailable = |reason: String| ScreenError::TrendUnavailable {
            symbol: reference.clone(),
            reason,
        };

        let series = self
            .gateway
            .fetch_candles(
                reference,
                self.config.reference_interval,
                self.config.reference_limit,
            )
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let ema = Oscillators::ema(series.candles(), self.config.trend_ema_span)
            .map_err(|e| unavailable(e.to_string()))?;
        let last = series
            .last()
            .ok_or_else(|| unavailable("empty series".to_string()))?;

        Ok(MarketTrend::new(reference.clone(), last.close, ema))
    }

    fn degrade(
        &self,
        machine: &mut screening_run::StateMachine,
        e: ScreenError,
        scanned: usize,
    ) -> ScreeningSnapshot {
        error!("{e}; publishing an empty snapshot");
        advance(machine, screening_run::Input::TrendFailed);
        ScreeningSnapshot::degraded(self.config.reference_symbol.clone(), scanned)
    }

    async fn collect_funding(&self, symbols: &[String], deadline: Instant) -> FundingRates {
        let task = FundingTask {
            gateway: self.gateway.clone(),
        };
        fan_out(task, symbols, self.config.concurrency_cap(), deadline)
            .await
            .into_iter()
            .inspect(|(symbol, outcome)| {
                if let Err(reason) = outcome {
                    debug!("[{symbol}] funding rate unavailable: {reason}");
                }
            })
            .collect()
    }
}

/// Runs one service call per symbol, at most `cap` at a time, each bounded
/// by `deadline`. Outcomes come back in input order.
async fn fan_out<S>(
    service: S,
    symbols: &[String],
    cap: usize,
    deadline: Instant,
) -> Vec<(String, Result<S::Response, SkipReason>)>
where
    S: Service<String, Error = SkipReason> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
{
    let limited = ConcurrencyLimit::new(service, cap);

    let handles: Vec<_> = symbols
        .iter()
        .cloned()
        .map(|symbol| {
            let mut worker = limited.clone();
            tokio::spawn(async move {
                let work = async {
                    poll_fn(|cx| worker.poll_ready(cx)).await?;
                    worker.call(symbol).await
                };
                tokio::time::timeout_at(deadline, work)
                    .await
                    .unwrap_or(Err(SkipReason::DeadlineExceeded))
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .zip(symbols)
        .map(|(joined, symbol)| {
            let outcome = joined.unwrap_or_else(|e| Err(SkipReason::TaskFailed(e.to_string())));
            (symbol.clone(), outcome)
        })
        .collect()
}

#[derive(Clone)]
struct SymbolTask {
    gateway: Arc<GatewayStack>,
    config: Arc<ScreenerConfig>,
    funding: Option<Arc<FundingRates>>,
}

impl SymbolTask {
    async fn process(&self, symbol: &str) -> Result<IndicatorSnapshot, SkipReason> {
        let funding_rate = match &self.funding {
            Some(rates) => match rates.get(symbol) {
                Some(Ok(rate)) => Some(*rate),
                Some(Err(reason)) => return Err(reason.clone()),
                None => return Err(SkipReason::MissingFundingRate),
            },
            None => None,
        };

        let series = self
            .gateway
            .fetch_candles(symbol, self.config.pair_interval, self.config.pair_limit())
            .await?;
        debug!(
            "[{}] {} bars of {}",
            series.symbol(),
            series.len(),
            series.interval()
        );

        indicator_snapshot(&series, &self.config, funding_rate)
    }
}

impl Service<String> for SymbolTask {
    type Response = IndicatorSnapshot;
    type Error = SkipReason;
    type Future = BoxFuture<'static, Result<IndicatorSnapshot, SkipReason>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, symbol: String) -> Self::Future {
        let task = self.clone();
        Box::pin(async move { task.process(&symbol).await })
    }
}

#[derive(Clone)]
struct FundingTask {
    gateway: Arc<GatewayStack>,
}

impl Service<String> for FundingTask {
    type Response = f64;
    type Error = SkipReason;
    type Future = BoxFuture<'static, Result<f64, SkipReason>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, symbol: String) -> Self::Future {
        let gateway = self.gateway.clone();
        Box::pin(async move {
            gateway
                .fetch_funding_rate(&symbol)
                .await
                .map_err(SkipReason::from)
        })
    }
}
