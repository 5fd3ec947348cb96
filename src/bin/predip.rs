use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};

use predip::cli::Args;
use predip::gateway::binance::BinanceGateway;
use predip::helpers::load_symbols;
use predip::{Screener, ScreeningSnapshot};

fn print_snapshot(snapshot: &ScreeningSnapshot, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let symbols = load_symbols(&args.symbols_file)
        .with_context(|| format!("reading symbols from {}", args.symbols_file.display()))?;
    if symbols.is_empty() {
        bail!("no symbols in {}", args.symbols_file.display());
    }
    info!("loaded {} symbols", symbols.len());

    let screener = Screener::new(args.to_config(), BinanceGateway::new(None));

    let Some(period) = args.watch else {
        let snapshot = screener.screen(&symbols).await;
        info!("{}", snapshot.headline());
        return print_snapshot(&snapshot, args.pretty);
    };

    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = screener.screen(&symbols).await;
                info!("{} ({})", snapshot.headline(), snapshot.id);
                if snapshot.degraded {
                    warn!("market trend unavailable, snapshot is empty");
                }
                print_snapshot(&snapshot, args.pretty)?;
                screener.prune();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}
