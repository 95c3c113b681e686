//! Candle retrieval from the exchange.
//! -----------------------------------------------------------------
//! ‣ [`CandleSource`] is the only thing the screening pipeline sees.
//! ‣ [`BinanceSource`] pages through the public REST kline endpoint.
//! ‣ Symbols may be given as `BTCUSDT`, `BTC/USDT` or `BTC/USDT:USDT`.
//! -----------------------------------------------------------------

use std::{str::FromStr, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::services::fvg::{Candle, CandleSeries, Timeframe};
use crate::utils::errors::ApiError;

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles opened at or after `since`, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> Result<CandleSeries, ApiError>;

    async fn last_price(&self, symbol: &str) -> Result<f64, ApiError>;

    /// Tradable symbols; sources without discovery return none.
    async fn list_symbols(&self) -> Result<Vec<String>, ApiError> {
        Ok(Vec::new())
    }
}

/* ─────────────────────────────────────────  Market ───────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Spot,
    Futures,
}

impl Market {
    fn base_url(&self) -> &'static str {
        match self {
            Market::Spot => "https://api.binance.com",
            Market::Futures => "https://fapi.binance.com",
        }
    }

    fn klines_path(&self) -> &'static str {
        match self {
            Market::Spot => "/api/v3/klines",
            Market::Futures => "/fapi/v1/klines",
        }
    }

    fn ticker_path(&self) -> &'static str {
        match self {
            Market::Spot => "/api/v3/ticker/price",
            Market::Futures => "/fapi/v1/ticker/price",
        }
    }

    fn page_limit(&self) -> usize {
        match self {
            Market::Spot => 1000,
            Market::Futures => 1500,
        }
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Market::Spot),
            "futures" | "future" | "perp" => Ok(Market::Futures),
            other => Err(format!("unknown market '{other}' (spot | futures)")),
        }
    }
}

/// `BTC/USDT:USDT` → `BTCUSDT`. Spot drops the `1000` multiplier prefix
/// futures listings use for low-priced coins.
pub fn exchange_symbol(raw: &str, market: Market) -> String {
    let pair = raw.split(':').next().unwrap_or(raw);
    let mut sym: String = pair
        .chars()
        .filter(|c| *c != '/' && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase();
    if market == Market::Spot {
        if let Some(rest) = sym.strip_prefix("1000") {
            sym = rest.to_string();
        }
    }
    sym
}

/* ─────────────────────────────────────────  Binance REST ─── */

#[derive(Clone)]
pub struct BinanceSource {
    http: reqwest::Client,
    market: Market,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

impl BinanceSource {
    pub fn new(market: Market) -> Self {
        Self::with_base_url(market, market.base_url())
    }

    pub fn with_base_url(market: Market, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            market,
            base_url: base_url.into(),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, ApiError> {
        let started = Instant::now();
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        log::debug!("GET {path} {:?} took {:?}", query, started.elapsed());

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return Err(ApiError::RateLimited(format!("{path} returned {status}")));
        }
        Ok(resp.error_for_status()?)
    }

    async fn klines_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ms: i64,
    ) -> Result<Vec<Vec<Value>>, ApiError> {
        let start = start_ms.to_string();
        let limit = self.market.page_limit().to_string();
        let resp = self
            .get(
                self.market.klines_path(),
                &[
                    ("symbol", symbol),
                    ("interval", timeframe.as_str()),
                    ("startTime", start.as_str()),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CandleSource for BinanceSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> Result<CandleSeries, ApiError> {
        let sym = exchange_symbol(symbol, self.market);
        let limit = self.market.page_limit();
        let now_ms = Utc::now().timestamp_millis();
        let mut start_ms = since.timestamp_millis();
        let mut candles: Vec<Candle> = Vec::new();

        loop {
            let rows = self.klines_page(&sym, timeframe, start_ms).await?;
            let page_len = rows.len();
            for row in &rows {
                match parse_kline(row) {
                    Some(c) => candles.push(c),
                    None => log::warn!("{sym} {timeframe}: skipping malformed kline {row:?}"),
                }
            }
            if page_len < limit {
                break;
            }
            match candles.last() {
                Some(c) if c.ts.timestamp_millis() + 1 > start_ms => {
                    start_ms = c.ts.timestamp_millis() + 1;
                }
                _ => break,
            }
            if start_ms > now_ms {
                break;
            }
        }

        log::debug!("{sym} {timeframe}: fetched {} candles", candles.len());
        Ok(CandleSeries::from_unordered(candles))
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ApiError> {
        let sym = exchange_symbol(symbol, self.market);
        let resp = self
            .get(self.market.ticker_path(), &[("symbol", sym.as_str())])
            .await?;
        let ticker: TickerPrice = resp.json().await?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|_| ApiError::Other(format!("{sym}: bad ticker price '{}'", ticker.price)))
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ApiError> {
        let resp = self.get(self.market.ticker_path(), &[]).await?;
        let tickers: Vec<TickerPrice> = resp.json().await?;
        Ok(usdt_symbols(tickers))
    }
}

fn usdt_symbols(tickers: Vec<TickerPrice>) -> Vec<String> {
    let mut out: Vec<String> = tickers
        .into_iter()
        .map(|t| t.symbol)
        .filter(|s| s.ends_with("USDT"))
        .collect();
    out.sort();
    out.dedup();
    out
}

fn num(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
fn parse_kline(row: &[Value]) -> Option<Candle> {
    let open_ms = row.first()?.as_i64()?;
    Some(Candle {
        ts: DateTime::<Utc>::from_timestamp_millis(open_ms)?,
        open: num(row.get(1)?)?,
        high: num(row.get(2)?)?,
        low: num(row.get(3)?)?,
        close: num(row.get(4)?)?,
        volume: num(row.get(5)?)?,
    })
}
