// src/services/fvg/common.rs
use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts:     DateTime<Utc>,
    pub open:   f64,
    pub high:   f64,
    pub low:    f64,
    pub close:  f64,
    pub volume: f64,
}

impl Candle {
    /// Open above close. A doji counts as bullish/neutral.
    pub fn is_bearish(&self) -> bool {
        self.open > self.close
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    Bullish,
    Bearish,
}

impl fmt::Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapKind::Bullish => write!(f, "bullish"),
            GapKind::Bearish => write!(f, "bearish"),
        }
    }
}

/* ─────────────────────────────────────────  Timeframe ────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]  M1,
    #[serde(rename = "3m")]  M3,
    #[serde(rename = "5m")]  M5,
    #[serde(rename = "15m")] M15,
    #[serde(rename = "30m")] M30,
    #[serde(rename = "1h")]  H1,
    #[serde(rename = "2h")]  H2,
    #[serde(rename = "4h")]  H4,
    #[serde(rename = "6h")]  H6,
    #[serde(rename = "12h")] H12,
    #[serde(rename = "1d")]  D1,
    #[serde(rename = "1w")]  W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 12] = [
        Timeframe::M1, Timeframe::M3, Timeframe::M5, Timeframe::M15, Timeframe::M30,
        Timeframe::H1, Timeframe::H2, Timeframe::H4, Timeframe::H6, Timeframe::H12,
        Timeframe::D1, Timeframe::W1,
    ];

    /// Exchange interval string, e.g. `"5m"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1_440,
            Timeframe::W1 => 10_080,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == wanted)
            .ok_or_else(|| format!("unknown timeframe '{s}'"))
    }
}

/* ─────────────────────────────────────────  CandleSeries ─── */

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("candle {index} is not strictly after its predecessor")]
    OutOfOrder { index: usize },
}

/// Candles for one (symbol, timeframe), strictly increasing by `ts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Candle>", into = "Vec<Candle>")]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        if let Some(i) = candles.windows(2).position(|w| w[1].ts <= w[0].ts) {
            return Err(SeriesError::OutOfOrder { index: i + 1 });
        }
        Ok(Self { candles })
    }

    /// Sorts and drops duplicate timestamps (last write wins).
    pub fn from_unordered(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.ts);
        let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
        for c in candles {
            match out.last_mut() {
                Some(last) if last.ts == c.ts => *last = c,
                _ => out.push(c),
            }
        }
        Self { candles: out }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Index of the candle opened at `ts`.
    pub fn position(&self, ts: DateTime<Utc>) -> Option<usize> {
        self.candles.binary_search_by_key(&ts, |c| c.ts).ok()
    }

    pub fn find(&self, ts: DateTime<Utc>) -> Option<&Candle> {
        self.position(ts).map(|i| &self.candles[i])
    }

    /// Candles with `since <= ts < until` (`until = None` means open ended).
    pub fn between(&self, since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Self {
        let start = self.candles.partition_point(|c| c.ts < since);
        let end = match until {
            Some(u) => self.candles.partition_point(|c| c.ts < u),
            None => self.candles.len(),
        };
        Self {
            candles: self.candles[start..end.max(start)].to_vec(),
        }
    }

    /// Drops the newest candle, which is still forming on a live feed.
    pub fn without_last(&self) -> Self {
        let n = self.candles.len().saturating_sub(1);
        Self {
            candles: self.candles[..n].to_vec(),
        }
    }
}

impl TryFrom<Vec<Candle>> for CandleSeries {
    type Error = SeriesError;

    fn try_from(candles: Vec<Candle>) -> Result<Self, Self::Error> {
        CandleSeries::new(candles)
    }
}

impl From<CandleSeries> for Vec<Candle> {
    fn from(series: CandleSeries) -> Self {
        series.candles
    }
}
