// tools/src/main.rs
use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;

use fvg_screener::{
    config::settings::{parse_symbols, ScreenerConfig},
    services::{
        market_data::{BinanceSource, CandleSource, Market},
        scheduler::{self, StopSignal},
        screener::ScreenWindow,
        sink::JsonFileSink,
    },
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "One-shot FVG screen against Binance", long_about = None)]
struct Cli {
    /// Comma separated symbols; all USDT pairs when omitted
    #[arg(long)]
    symbols: Option<String>,

    /// spot or futures
    #[arg(long, default_value = "futures")]
    market: Market,

    /// Directory the JSON report is written to
    #[arg(long, default_value = "results")]
    out: PathBuf,

    /// Screen the fine timeframe as of this RFC 3339 instant
    #[arg(long)]
    fine_until: Option<DateTime<Utc>>,

    /// Setups printed per symbol and direction
    #[arg(long, default_value_t = 3)]
    per_group: usize,

    /// Also list symbols trading outside their value area
    #[arg(long, default_value_t = false)]
    breakouts: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let cfg = ScreenerConfig::from_env().map_err(anyhow::Error::msg)?;
    let source: Arc<dyn CandleSource> = Arc::new(BinanceSource::new(cli.market));

    let symbols = match &cli.symbols {
        Some(raw) => parse_symbols(raw),
        None => source.list_symbols().await.context("symbol discovery")?,
    };
    anyhow::ensure!(!symbols.is_empty(), "no symbols to screen");
    log::info!("screening {} symbols on {:?}", symbols.len(), cli.market);

    let stop = StopSignal::new();
    let window = ScreenWindow::new(&cfg, Utc::now(), cli.fine_until);
    let cfg = Arc::new(cfg);
    let report = scheduler::run_screen(Arc::clone(&source), symbols.clone(), Arc::clone(&cfg), window, &stop).await;

    let path = JsonFileSink::new(&cli.out).write(&report).await.context("writing report")?;
    log::info!("report written to {}", path.display());
    log::info!(
        "{} setups across {} symbols in {:.1}s",
        report.total_setups,
        report.coins_analyzed.len(),
        report.execution_time_seconds
    );

    for s in report.summary() {
        println!("  {:<14} bullish {:>3}  bearish {:>3}", s.symbol, s.bullish, s.bearish);
    }

    for group in report.grouped(cli.per_group) {
        println!("\n{} {}", group.symbol, group.kind);
        for setup in &group.shown {
            println!(
                "  fine [{:.6} .. {:.6}] @ {}  price {:.6}  stop {:.6}  coarse [{:.6} .. {:.6}]",
                setup.fine_fvg.lower_line,
                setup.fine_fvg.upper_line,
                setup.fine_fvg.anchor_timestamp,
                setup.current_price,
                setup.stop_loss,
                setup.coarse_fvg.lower_line,
                setup.coarse_fvg.upper_line,
            );
        }
        if group.hidden > 0 {
            println!("  … {} more", group.hidden);
        }
    }

    if cli.breakouts {
        let found = scheduler::scan_breakouts(source, symbols, cfg, &stop).await;
        log::info!("{} symbols outside their value area", found.len());
        for r in &found {
            let side = if r.is_above() { "above" } else { "below" };
            println!("  {:<14} {:.6} {side} [{:.6} .. {:.6}]", r.symbol, r.current_price, r.val, r.vah);
        }
    }

    Ok(())
}
