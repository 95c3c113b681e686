// src/state.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::settings::ScreenerConfig;
use crate::db::models::ValueAreaResult;
use crate::services::{
    market_data::CandleSource,
    scheduler::{self, StopSignal},
    screener::{ScreenReport, ScreenWindow},
    sink::{JsonFileSink, ValueAreaStore},
};
use crate::utils::errors::ApiError;

/// Shared by the HTTP handlers and the periodic jobs.
pub struct AppState {
    pub source: Arc<dyn CandleSource>,
    pub store: Arc<dyn ValueAreaStore>,
    pub config: ScreenerConfig,
    /// Configured watch list; empty means ask the source.
    pub symbols: Vec<String>,
    pub sink: Option<JsonFileSink>,
    pub latest: RwLock<Option<ScreenReport>>,
    pub stop: StopSignal,
}

impl AppState {
    pub fn new(
        source: Arc<dyn CandleSource>,
        store: Arc<dyn ValueAreaStore>,
        config: ScreenerConfig,
        symbols: Vec<String>,
        sink: Option<JsonFileSink>,
    ) -> Self {
        Self {
            source,
            store,
            config,
            symbols,
            sink,
            latest: RwLock::new(None),
            stop: StopSignal::new(),
        }
    }

    /// Explicit list, else the configured list, else discovery.
    pub async fn resolve_symbols(&self, requested: &[String]) -> Result<Vec<String>, ApiError> {
        if !requested.is_empty() {
            return Ok(requested.to_vec());
        }
        if !self.symbols.is_empty() {
            return Ok(self.symbols.clone());
        }
        self.source.list_symbols().await
    }

    /// Runs one screen, writes the report file if a sink is set and keeps it
    /// as the latest report.
    pub async fn screen(
        &self,
        symbols: Vec<String>,
        cfg: ScreenerConfig,
        fine_until: Option<DateTime<Utc>>,
    ) -> ScreenReport {
        let window = ScreenWindow::new(&cfg, Utc::now(), fine_until);
        let report =
            scheduler::run_screen(Arc::clone(&self.source), symbols, Arc::new(cfg), window, &self.stop).await;

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write(&report).await {
                log::warn!("report {} not written: {e}", report.run_id);
            }
        }
        *self.latest.write().await = Some(report.clone());
        report
    }

    /// Scans for value-area breakouts and records them in the store.
    pub async fn scan(&self, symbols: Vec<String>) -> Result<Vec<ValueAreaResult>, ApiError> {
        let found = scheduler::scan_breakouts(
            Arc::clone(&self.source),
            symbols,
            Arc::new(self.config.clone()),
            &self.stop,
        )
        .await;
        self.store.record(&found).await?;
        Ok(found)
    }
}
