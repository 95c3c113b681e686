//! ─── Fair Value Gap detection ──────────────────────────────────────────────
//!
//! A gap is read off every candle triplet `(prev2, prev, curr)`:
//! * bullish  – `prev` not bearish and `curr.low  > prev2.high`
//! * bearish  – `prev` bearish     and `curr.high < prev2.low`
//!
//! Size is expressed relative to `prev.close`. The gap is anchored on the
//! middle candle, whose extremes are kept for stop placement.
//!
//! Fill tracking is a separate, optional pass ([`FillTracker`]); the detector
//! itself reports every structural gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Candle, CandleSeries, GapKind};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fvg {
    pub kind: GapKind,
    pub upper_line: f64,
    pub lower_line: f64,
    /// Open time of the middle candle.
    pub anchor_timestamp: DateTime<Utc>,
    pub gap_percent: f64,
    pub middle_high: f64,
    pub middle_low: f64,
}

impl Fvg {
    pub fn gap_size(&self) -> f64 {
        self.upper_line - self.lower_line
    }

    /// Closed-interval test on `[lower_line, upper_line]`.
    pub fn contains(&self, price: f64) -> bool {
        self.lower_line <= price && price <= self.upper_line
    }
}

/// Lazily scans `series` for gaps of at least `min_gap_percent` (inclusive).
///
/// Fewer than three candles yields nothing. Re-invoke on the same series to
/// restart.
pub fn detect(series: &CandleSeries, min_gap_percent: f64) -> impl Iterator<Item = Fvg> + '_ {
    series
        .candles()
        .windows(3)
        .filter_map(move |w| classify(&w[0], &w[1], &w[2], min_gap_percent))
}

fn classify(prev2: &Candle, prev: &Candle, curr: &Candle, min_gap_percent: f64) -> Option<Fvg> {
    // a non-positive reference close has no meaningful percentage
    if !(prev.close > 0.0) {
        return None;
    }

    let (kind, upper_line, lower_line) = if prev.is_bearish() {
        if curr.high >= prev2.low {
            return None;
        }
        (GapKind::Bearish, prev2.low, curr.high)
    } else {
        if curr.low <= prev2.high {
            return None;
        }
        (GapKind::Bullish, curr.low, prev2.high)
    };

    let gap_percent = (upper_line - lower_line) / prev.close * 100.0;
    if gap_percent < min_gap_percent {
        return None;
    }

    Some(Fvg {
        kind,
        upper_line,
        lower_line,
        anchor_timestamp: prev.ts,
        gap_percent,
        middle_high: prev.high,
        middle_low: prev.low,
    })
}

/// True when `price` sits inside any of `gaps`.
///
/// Boundaries are excluded unless `inclusive` is set.
pub fn price_within_gaps(gaps: &[Fvg], price: f64, inclusive: bool) -> bool {
    gaps.iter().any(|g| {
        if inclusive {
            g.contains(price)
        } else {
            g.lower_line < price && price < g.upper_line
        }
    })
}

/* ─────────────────────────────────────────  Fill tracking ── */

/// Marks gaps as filled once a candle after the triplet trades through the
/// whole interval: a bullish gap fills when price reaches its `lower_line`,
/// a bearish gap when price reaches its `upper_line`.
pub struct FillTracker<'a> {
    series: &'a CandleSeries,
}

impl<'a> FillTracker<'a> {
    pub fn new(series: &'a CandleSeries) -> Self {
        Self { series }
    }

    /// Open time of the first candle that filled `gap`, if any.
    ///
    /// Gaps whose anchor is not in the series are never reported filled.
    pub fn filled_at(&self, gap: &Fvg) -> Option<DateTime<Utc>> {
        let anchor = self.series.position(gap.anchor_timestamp)?;
        // anchor + 1 is the triplet's own third candle
        self.series
            .candles()
            .iter()
            .skip(anchor + 2)
            .find(|c| match gap.kind {
                GapKind::Bullish => c.low <= gap.lower_line,
                GapKind::Bearish => c.high >= gap.upper_line,
            })
            .map(|c| c.ts)
    }

    pub fn is_filled(&self, gap: &Fvg) -> bool {
        self.filled_at(gap).is_some()
    }

    pub fn unfilled<I>(&'a self, gaps: I) -> impl Iterator<Item = Fvg> + 'a
    where
        I: IntoIterator<Item = Fvg>,
        I::IntoIter: 'a,
    {
        gaps.into_iter().filter(move |g| !self.is_filled(g))
    }
}
