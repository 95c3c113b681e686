// src/services/fvg/value_area.rs
//
// Volume-profile value area over closing prices.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::CandleSeries;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueArea {
    pub high: f64,
    pub low: f64,
    pub point_of_control: f64,
}

impl ValueArea {
    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueAreaError {
    #[error("series is empty")]
    EmptySeries,
    #[error("series has zero total volume")]
    ZeroVolume,
    #[error("target fraction {0} outside (0, 1]")]
    InvalidFraction(f64),
    #[error("bucket count {0} must be positive")]
    InvalidBucketCount(usize),
}

/// Builds a `bucket_count` histogram of closes weighted by volume over
/// `[min close, max close]`, then widens from the point of control one
/// bucket lower and one bucket higher per step until `target_fraction` of
/// the volume is covered.
///
/// `high`/`low` are the left edges of the outermost included buckets and
/// `point_of_control` the left edge of the heaviest bucket (first on ties).
/// A series trading at a single price returns that price for all three.
pub fn compute(
    series: &CandleSeries,
    target_fraction: f64,
    bucket_count: usize,
) -> Result<ValueArea, ValueAreaError> {
    if !(target_fraction > 0.0 && target_fraction <= 1.0) {
        return Err(ValueAreaError::InvalidFraction(target_fraction));
    }
    if bucket_count == 0 {
        return Err(ValueAreaError::InvalidBucketCount(bucket_count));
    }
    let candles = series.candles();
    if candles.is_empty() {
        return Err(ValueAreaError::EmptySeries);
    }

    let total: f64 = candles.iter().map(|c| c.volume.max(0.0)).sum();
    if !(total > 0.0) {
        return Err(ValueAreaError::ZeroVolume);
    }

    let (min, max) = candles.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c.close), hi.max(c.close))
    });
    if max <= min {
        return Ok(ValueArea { high: min, low: min, point_of_control: min });
    }

    let width = (max - min) / bucket_count as f64;
    let mut hist = vec![0.0_f64; bucket_count];
    for c in candles {
        // the top edge belongs to the last bucket
        let idx = (((c.close - min) / width) as usize).min(bucket_count - 1);
        hist[idx] += c.volume.max(0.0);
    }

    let mut poc = 0;
    for (i, v) in hist.iter().enumerate() {
        if *v > hist[poc] {
            poc = i;
        }
    }

    let edge = |i: usize| min + width * i as f64;
    let target = total * target_fraction;
    let mut covered = hist[poc];
    let (mut lo, mut hi) = (poc, poc);

    for step in 1..bucket_count {
        if covered >= target {
            break;
        }
        if let Some(i) = poc.checked_sub(step) {
            covered += hist[i];
            lo = i;
        }
        if poc + step < bucket_count {
            covered += hist[poc + step];
            hi = poc + step;
        }
    }

    Ok(ValueArea {
        high: edge(hi),
        low: edge(lo),
        point_of_control: edge(poc),
    })
}
