//! ─── Per-symbol screening pipeline ─────────────────────────────────────────
//!
//! price → coarse candles → coarse gaps → fine candles → fine gaps
//!       → [value area] → alignment → setups
//!
//! Every step is sequential for one symbol; batches across symbols live in
//! [`crate::services::scheduler`].

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::settings::{ScreenerConfig, ValueAreaSource};
use crate::db::models::ValueAreaResult;
use crate::services::fvg::{
    align, assemble, detect, middle_candle, price_within_gaps, value_area, CandleSeries, FillTracker,
    Fvg, GapKind, Setup, Timeframe, ValueArea,
};
use crate::services::market_data::CandleSource;
use crate::utils::errors::ScreenError;

/// Time bounds of one screen. `fine_until` pins the fine series to a
/// historical window; otherwise both series run up to now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenWindow {
    pub coarse_since: DateTime<Utc>,
    pub fine_since: DateTime<Utc>,
    pub fine_until: Option<DateTime<Utc>>,
}

impl ScreenWindow {
    pub fn new(cfg: &ScreenerConfig, now: DateTime<Utc>, fine_until: Option<DateTime<Utc>>) -> Self {
        let fine_end = fine_until.unwrap_or(now);
        Self {
            coarse_since: now - Duration::hours(cfg.coarse_lookback_hours),
            fine_since: fine_end - Duration::hours(cfg.fine_lookback_hours),
            fine_until,
        }
    }
}

/* ─────────────────────────────────────────  Pipeline ─────── */

pub async fn screen_symbol(
    source: &dyn CandleSource,
    symbol: &str,
    cfg: &ScreenerConfig,
    window: &ScreenWindow,
) -> Result<Vec<Setup>, ScreenError> {
    let price = source
        .last_price(symbol)
        .await
        .map_err(|e| ScreenError::external(symbol, e))?;
    if price < cfg.min_current_price {
        log::debug!("{symbol}: price {price} below floor, skipped");
        return Ok(Vec::new());
    }

    let coarse = load(source, symbol, cfg.coarse_timeframe, window.coarse_since, None, cfg).await?;
    let coarse_gaps = gaps(&coarse, cfg.min_gap_percent_coarse, cfg.require_unfilled);
    if coarse_gaps.is_empty() {
        log::debug!("{symbol}: no {} gaps", cfg.coarse_timeframe);
        return Ok(Vec::new());
    }

    let fine = load(source, symbol, cfg.fine_timeframe, window.fine_since, window.fine_until, cfg).await?;
    let fine_gaps = gaps(&fine, cfg.min_gap_percent_fine, cfg.require_unfilled);

    let va = if cfg.apply_value_area_filter {
        let basis = match cfg.value_area_source {
            ValueAreaSource::Coarse => &coarse,
            ValueAreaSource::Fine => &fine,
        };
        match value_area::compute(basis, cfg.value_area_target_fraction, cfg.value_area_bucket_count) {
            Ok(va) => Some(va),
            Err(e) => {
                log::warn!("{symbol}: {}, value-area gate skipped", ScreenError::from(e));
                None
            }
        }
    } else {
        None
    };

    let pairs = align(&coarse_gaps, &fine_gaps, &cfg.alignment_rules(), va.as_ref());
    log::debug!(
        "{symbol}: {} coarse / {} fine gaps, {} aligned",
        coarse_gaps.len(),
        fine_gaps.len(),
        pairs.len()
    );

    Ok(pairs
        .iter()
        .map(|p| {
            let mid = fine
                .find(p.fine.anchor_timestamp)
                .copied()
                .unwrap_or_else(|| middle_candle(&p.fine));
            assemble(symbol, p, price, &mid, va, cfg.risk_reward_ratio)
        })
        .collect())
}

async fn load(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: Timeframe,
    since: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    cfg: &ScreenerConfig,
) -> Result<CandleSeries, ScreenError> {
    let fetched = source
        .fetch_candles(symbol, timeframe, since)
        .await
        .map_err(|e| ScreenError::external(symbol, e))?;

    let mut series = fetched.between(since, until);
    // a bounded window ends in the past, so its last candle is closed
    if cfg.skip_forming_candle && until.is_none() {
        series = series.without_last();
    }
    if series.len() < 3 {
        return Err(ScreenError::unavailable(
            symbol,
            timeframe,
            format!("{} candles since {since}", series.len()),
        ));
    }
    Ok(series)
}

fn gaps(series: &CandleSeries, min_gap_percent: f64, require_unfilled: bool) -> Vec<Fvg> {
    let found = detect(series, min_gap_percent);
    if require_unfilled {
        let tracker = FillTracker::new(series);
        let open: Vec<Fvg> = tracker.unfilled(found).collect();
        open
    } else {
        found.collect()
    }
}

/* ─────────────────────────────────────────  Breakouts ────── */

pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .unwrap_or(now)
}

/// Candles of `breakout_gap_timeframe` scanned for the gap pre-filter.
const GAP_FILTER_CANDLES: i32 = 500;

/// Value area of the month-to-date `breakout_timeframe` series, and whether
/// the last price has left it. `Ok(None)` means price is inside, or outside
/// every recent gap when `breakout_gap_filter` is on.
pub async fn check_value_area(
    source: &dyn CandleSource,
    symbol: &str,
    cfg: &ScreenerConfig,
    now: DateTime<Utc>,
) -> Result<Option<ValueAreaResult>, ScreenError> {
    let price = source
        .last_price(symbol)
        .await
        .map_err(|e| ScreenError::external(symbol, e))?;

    if cfg.breakout_gap_filter && !inside_recent_gap(source, symbol, cfg, price, now).await? {
        log::debug!("{symbol}: {price} outside every {} gap, skipped", cfg.breakout_gap_timeframe);
        return Ok(None);
    }

    let since = month_start(now);
    let series = source
        .fetch_candles(symbol, cfg.breakout_timeframe, since)
        .await
        .map_err(|e| ScreenError::external(symbol, e))?;
    if series.is_empty() {
        return Err(ScreenError::unavailable(symbol, cfg.breakout_timeframe, "no candles this month"));
    }

    let va: ValueArea = value_area::compute(
        &series,
        cfg.breakout_target_fraction,
        cfg.value_area_bucket_count,
    )?;

    if price > va.high || price < va.low {
        Ok(Some(ValueAreaResult::new(symbol, price, va.high, va.low, now)))
    } else {
        Ok(None)
    }
}

async fn inside_recent_gap(
    source: &dyn CandleSource,
    symbol: &str,
    cfg: &ScreenerConfig,
    price: f64,
    now: DateTime<Utc>,
) -> Result<bool, ScreenError> {
    let tf = cfg.breakout_gap_timeframe;
    let series = source
        .fetch_candles(symbol, tf, now - tf.duration() * GAP_FILTER_CANDLES)
        .await
        .map_err(|e| ScreenError::external(symbol, e))?;
    let gaps: Vec<Fvg> = detect(&series, 0.0).collect();
    Ok(price_within_gaps(&gaps, price, false))
}

/* ─────────────────────────────────────────  Report ───────── */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPeriods {
    pub coarse: AnalysisPeriod,
    pub fine: AnalysisPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub coins_analyzed: Vec<String>,
    pub analysis_periods: AnalysisPeriods,
    pub min_gap_thresholds: BTreeMap<String, f64>,
    pub execution_time_seconds: f64,
    pub total_setups: usize,
    pub setups: Vec<Setup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub bullish: usize,
    pub bearish: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupGroup<'a> {
    pub symbol: &'a str,
    pub kind: GapKind,
    pub shown: Vec<&'a Setup>,
    pub hidden: usize,
}

impl ScreenReport {
    pub fn new(
        coins: Vec<String>,
        cfg: &ScreenerConfig,
        window: &ScreenWindow,
        elapsed: std::time::Duration,
        mut setups: Vec<Setup>,
    ) -> Self {
        setups.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(a.fine_fvg.anchor_timestamp.cmp(&b.fine_fvg.anchor_timestamp))
                .then(a.coarse_fvg.anchor_timestamp.cmp(&b.coarse_fvg.anchor_timestamp))
        });

        let mut thresholds = BTreeMap::new();
        thresholds.insert(cfg.coarse_timeframe.to_string(), cfg.min_gap_percent_coarse);
        thresholds.insert(cfg.fine_timeframe.to_string(), cfg.min_gap_percent_fine);

        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            coins_analyzed: coins,
            analysis_periods: AnalysisPeriods {
                coarse: AnalysisPeriod {
                    timeframe: cfg.coarse_timeframe,
                    since: window.coarse_since,
                    until: None,
                },
                fine: AnalysisPeriod {
                    timeframe: cfg.fine_timeframe,
                    since: window.fine_since,
                    until: window.fine_until,
                },
            },
            min_gap_thresholds: thresholds,
            execution_time_seconds: elapsed.as_secs_f64(),
            total_setups: setups.len(),
            setups,
        }
    }

    /// Bullish/bearish counts for every analysed coin, in input order.
    pub fn summary(&self) -> Vec<SymbolSummary> {
        self.coins_analyzed
            .iter()
            .map(|sym| {
                let mine = self.setups.iter().filter(|s| &s.symbol == sym);
                let (bullish, bearish) = mine.fold((0, 0), |(b, s), x| match x.kind {
                    GapKind::Bullish => (b + 1, s),
                    GapKind::Bearish => (b, s + 1),
                });
                SymbolSummary { symbol: sym.clone(), bullish, bearish }
            })
            .collect()
    }

    /// Setups grouped by (symbol, kind), at most `per_group` listed each.
    pub fn grouped(&self, per_group: usize) -> Vec<SetupGroup<'_>> {
        let mut groups: BTreeMap<(&str, GapKind), Vec<&Setup>> = BTreeMap::new();
        for s in &self.setups {
            groups.entry((s.symbol.as_str(), s.kind)).or_default().push(s);
        }
        groups
            .into_iter()
            .map(|((symbol, kind), all)| SetupGroup {
                symbol,
                kind,
                hidden: all.len().saturating_sub(per_group),
                shown: all.into_iter().take(per_group).collect(),
            })
            .collect()
    }

    /// Copy keeping only setups whose fine gap formed at or after `since`.
    pub fn filtered_since(&self, since: DateTime<Utc>) -> ScreenReport {
        let setups: Vec<Setup> = self
            .setups
            .iter()
            .filter(|s| s.fine_fvg.anchor_timestamp >= since)
            .cloned()
            .collect();
        ScreenReport {
            total_setups: setups.len(),
            setups,
            ..self.clone()
        }
    }
}
