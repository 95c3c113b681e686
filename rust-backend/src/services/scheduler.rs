use crate::{
    config::settings::ScreenerConfig,
    db::models::ValueAreaResult,
    services::{
        market_data::CandleSource,
        screener::{self, ScreenReport, ScreenWindow},
    },
    utils::errors::ScreenError,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::{
    future::{self, abortable, AbortHandle},
    stream, StreamExt,
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

type JobMap = DashMap<String, AbortHandle>;
static JOBS: once_cell::sync::Lazy<JobMap> = once_cell::sync::Lazy::new(JobMap::default);

/// Cooperative "stop launching new symbols" flag. Running pipelines finish.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs `task` once per symbol on at most `workers` tokio tasks at a time and
/// concatenates the results in completion order.
///
/// A failing or panicking symbol is logged and contributes nothing.
pub async fn fan_out<T, F, Fut>(
    symbols: Vec<String>,
    workers: usize,
    stop: &StopSignal,
    task: F,
) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<T>, ScreenError>> + Send + 'static,
{
    let stop = stop.clone();
    let task = &task;

    let per_symbol: Vec<Vec<T>> = stream::iter(symbols)
        .take_while(move |_| future::ready(!stop.is_stopped()))
        .map(|symbol| {
            let handle = tokio::spawn(task(symbol.clone()));
            async move { (symbol, handle.await) }
        })
        .buffer_unordered(workers.max(1))
        .map(|(symbol, joined)| match joined {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                log::log!(e.log_level(), "{symbol}: {e}");
                Vec::new()
            }
            Err(e) => {
                log::error!("{symbol}: worker died: {e}");
                Vec::new()
            }
        })
        .collect()
        .await;

    per_symbol.into_iter().flatten().collect()
}

pub async fn run_screen(
    source: Arc<dyn CandleSource>,
    symbols: Vec<String>,
    cfg: Arc<ScreenerConfig>,
    window: ScreenWindow,
    stop: &StopSignal,
) -> ScreenReport {
    let started = Instant::now();
    log::info!("screening {} symbols with {} workers", symbols.len(), cfg.workers);

    let setups = fan_out(symbols.clone(), cfg.workers, stop, |symbol| {
        let source = Arc::clone(&source);
        let cfg = Arc::clone(&cfg);
        async move { screener::screen_symbol(source.as_ref(), &symbol, &cfg, &window).await }
    })
    .await;

    let report = ScreenReport::new(symbols, &cfg, &window, started.elapsed(), setups);
    log::info!(
        "screen {} done: {} setups in {:.1}s",
        report.run_id,
        report.total_setups,
        report.execution_time_seconds
    );
    report
}

pub async fn scan_breakouts(
    source: Arc<dyn CandleSource>,
    symbols: Vec<String>,
    cfg: Arc<ScreenerConfig>,
    stop: &StopSignal,
) -> Vec<ValueAreaResult> {
    let now = Utc::now();
    let workers = cfg.workers;
    let mut found: Vec<ValueAreaResult> = fan_out(symbols, workers, stop, |symbol| {
        let source = Arc::clone(&source);
        let cfg = Arc::clone(&cfg);
        async move {
            let hit = screener::check_value_area(source.as_ref(), &symbol, &cfg, now).await?;
            Ok::<_, ScreenError>(hit.into_iter().collect::<Vec<_>>())
        }
    })
    .await;
    found.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    log::info!("value-area scan: {} symbols outside", found.len());
    found
}

/* ─────────────────────────────────────────  Periodic jobs ── */

/// Runs `job` every `every` (first run immediately) until [`cancel`]led.
/// Re-registering a name aborts the previous job.
pub fn spawn_periodic<F, Fut>(name: &str, every: Duration, job: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let label = name.to_string();
    let (task, abort) = abortable(async move {
        let mut iv = tokio::time::interval(every);
        loop {
            iv.tick().await;
            if let Err(e) = job().await {
                log::error!("job {label}: {e:?}");
            }
        }
    });

    tokio::spawn(task);
    if let Some(previous) = JOBS.insert(name.to_string(), abort) {
        previous.abort();
    }
}

/// True if a job by that name was running.
pub fn cancel(name: &str) -> bool {
    match JOBS.remove(name) {
        Some((_, abort)) => {
            abort.abort();
            true
        }
        None => false,
    }
}
