// src/services/candle_cache.rs
//
// Key-value candle cache in front of a CandleSource. Stale or missing
// entries fall through to the source; a write failure only costs a refetch.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::db::redis::RedisPool;
use crate::services::fvg::{CandleSeries, Timeframe};
use crate::services::market_data::{exchange_symbol, CandleSource, Market};
use crate::utils::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl CacheKey {
    /// `BTC/USDT`, `BTC/USDT:USDT` and `btcusdt` share one key.
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self { symbol: exchange_symbol(symbol, Market::Futures), timeframe }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "candles:{}:{}", self.symbol, self.timeframe)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSeries {
    pub stored_at: DateTime<Utc>,
    pub series: CandleSeries,
}

/// When a cached series may be served instead of refetching.
///
/// Both policies first require the entry to reach back to the requested
/// `since` (within one candle).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StalenessPolicy {
    /// Fresh while `stored_at + secs` is in the future.
    Ttl { secs: i64 },
    /// Fresh while the newest candle is at most one candle plus
    /// `tolerance_secs` old.
    Covering { tolerance_secs: i64 },
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        StalenessPolicy::Ttl { secs: 300 }
    }
}

impl StalenessPolicy {
    pub fn is_fresh(
        &self,
        entry: &CachedSeries,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let (Some(first), Some(last)) = (entry.series.first(), entry.series.last()) else {
            return false;
        };
        if first.ts > since + timeframe.duration() {
            return false;
        }
        match *self {
            StalenessPolicy::Ttl { secs } => now - entry.stored_at < Duration::seconds(secs),
            StalenessPolicy::Covering { tolerance_secs } => {
                now - last.ts <= timeframe.duration() + Duration::seconds(tolerance_secs)
            }
        }
    }
}

#[async_trait]
pub trait CandleCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedSeries>, ApiError>;
    async fn put(&self, key: &CacheKey, series: &CandleSeries) -> Result<(), ApiError>;
}

/* ─────────────────────────────────────────  Backends ─────── */

#[derive(Default)]
pub struct MemoryCandleCache {
    entries: DashMap<CacheKey, CachedSeries>,
}

impl MemoryCandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CandleCache for MemoryCandleCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedSeries>, ApiError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &CacheKey, series: &CandleSeries) -> Result<(), ApiError> {
        self.entries.insert(
            key.clone(),
            CachedSeries { stored_at: Utc::now(), series: series.clone() },
        );
        Ok(())
    }
}

pub struct RedisCandleCache {
    pool: RedisPool,
    /// Hard expiry on the Redis side; the staleness policy still applies.
    expire_secs: u64,
}

impl RedisCandleCache {
    pub fn new(pool: RedisPool, expire_secs: u64) -> Self {
        Self { pool, expire_secs }
    }
}

#[async_trait]
impl CandleCache for RedisCandleCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedSeries>, ApiError> {
        self.pool.get_json(&key.to_string()).await
    }

    async fn put(&self, key: &CacheKey, series: &CandleSeries) -> Result<(), ApiError> {
        let entry = CachedSeries { stored_at: Utc::now(), series: series.clone() };
        self.pool.set_json(&key.to_string(), &entry, self.expire_secs).await
    }
}

/* ─────────────────────────────────────────  Read-through ─── */

pub struct CachedSource {
    inner: Arc<dyn CandleSource>,
    cache: Arc<dyn CandleCache>,
    policy: StalenessPolicy,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn CandleSource>, cache: Arc<dyn CandleCache>, policy: StalenessPolicy) -> Self {
        Self { inner, cache, policy }
    }
}

#[async_trait]
impl CandleSource for CachedSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> Result<CandleSeries, ApiError> {
        let key = CacheKey::new(symbol, timeframe);
        match self.cache.get(&key).await {
            Ok(Some(entry)) if self.policy.is_fresh(&entry, timeframe, since, Utc::now()) => {
                log::debug!("{key}: cache hit");
                return Ok(entry.series.between(since, None));
            }
            Ok(_) => log::debug!("{key}: cache miss"),
            Err(e) => log::warn!("{key}: cache read failed: {e}"),
        }

        let series = self.inner.fetch_candles(symbol, timeframe, since).await?;
        if !series.is_empty() {
            if let Err(e) = self.cache.put(&key, &series).await {
                log::warn!("{key}: cache write failed: {e}");
            }
        }
        Ok(series)
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ApiError> {
        self.inner.last_price(symbol).await
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ApiError> {
        self.inner.list_symbols().await
    }
}
