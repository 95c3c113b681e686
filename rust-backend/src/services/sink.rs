// src/services/sink.rs
//
// Where screen output goes: JSON report files and the value-area store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;

use crate::db::{models::ValueAreaResult, queries};
use crate::services::screener::ScreenReport;
use crate::utils::errors::ApiError;

/* ─────────────────────────────────────────  JSON reports ─── */

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `fvg_screen_<YYYYmmdd_HHMMSS>_<run id prefix>.json`; runs finishing in
    /// the same second get distinct files.
    pub fn file_name(report: &ScreenReport) -> String {
        let run = report.run_id.simple().to_string();
        format!(
            "fvg_screen_{}_{}.json",
            report.timestamp.format("%Y%m%d_%H%M%S"),
            &run[..8]
        )
    }

    /// Writes the report via a temp file and rename, so readers never see a
    /// partial report. The temp file is removed if either step fails.
    pub async fn write(&self, report: &ScreenReport) -> Result<PathBuf, ApiError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(report));
        let tmp = self.dir.join(format!(".{}.tmp", report.run_id));

        let body = serde_json::to_vec_pretty(report)?;
        let written = async {
            tokio::fs::write(&tmp, body).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(e) = written {
            if let Err(rm) = tokio::fs::remove_file(&tmp).await {
                log::debug!("{} not removed: {rm}", tmp.display());
            }
            return Err(e.into());
        }

        log::info!("wrote {} setups to {}", report.total_setups, path.display());
        Ok(path)
    }
}

/* ─────────────────────────────────────────  Value-area store */

#[async_trait]
pub trait ValueAreaStore: Send + Sync {
    async fn record(&self, rows: &[ValueAreaResult]) -> Result<(), ApiError>;

    /// Latest row per symbol, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ValueAreaResult>, ApiError>;
}

pub struct PgValueAreaStore {
    pool: PgPool,
}

impl PgValueAreaStore {
    pub async fn connect(pool: PgPool) -> Result<Self, ApiError> {
        queries::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ValueAreaStore for PgValueAreaStore {
    async fn record(&self, rows: &[ValueAreaResult]) -> Result<(), ApiError> {
        if rows.is_empty() {
            return Ok(());
        }
        queries::insert_value_area_results(&self.pool, rows).await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ValueAreaResult>, ApiError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(queries::recent_value_area_results(&self.pool, limit).await?)
    }
}

/// Keeps only the newest row per symbol.
#[derive(Default)]
pub struct MemoryValueAreaStore {
    latest: DashMap<String, ValueAreaResult>,
}

impl MemoryValueAreaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValueAreaStore for MemoryValueAreaStore {
    async fn record(&self, rows: &[ValueAreaResult]) -> Result<(), ApiError> {
        for r in rows {
            let newer = self
                .latest
                .get(&r.symbol)
                .map_or(true, |old| old.created_at <= r.created_at);
            if newer {
                self.latest.insert(r.symbol.clone(), r.clone());
            }
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ValueAreaResult>, ApiError> {
        let mut rows: Vec<ValueAreaResult> = self.latest.iter().map(|e| e.value().clone()).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.symbol.cmp(&b.symbol)));
        rows.truncate(limit);
        Ok(rows)
    }
}
