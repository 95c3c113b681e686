use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

use crate::services::candle_cache::StalenessPolicy;
use crate::services::fvg::{AlignmentPolicy, AlignmentRules, Timeframe};
use crate::services::market_data::Market;

/// 30 days.
pub const MAX_ALIGNMENT_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;
/// Ten years.
pub const MAX_LOOKBACK_HOURS: i64 = 10 * 365 * 24;

/// Knobs for one screen, threaded explicitly into every pipeline call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerConfig {
    #[serde(default = "default_coarse_tf")]
    pub coarse_timeframe: Timeframe,
    #[serde(default = "default_fine_tf")]
    pub fine_timeframe: Timeframe,
    #[serde(default = "default_min_gap_coarse")]
    pub min_gap_percent_coarse: f64,
    #[serde(default = "default_min_gap_fine")]
    pub min_gap_percent_fine: f64,

    #[serde(default = "default_va_fraction")]
    pub value_area_target_fraction: f64,
    #[serde(default = "default_va_buckets")]
    pub value_area_bucket_count: usize,
    #[serde(default)]
    pub value_area_source: ValueAreaSource,
    #[serde(default)]
    pub apply_value_area_filter: bool,

    #[serde(default)]
    pub alignment_policy: AlignmentPolicy,
    /// `None` disables the anchor-distance gate.
    #[serde(default)]
    pub alignment_window_secs: Option<i64>,
    #[serde(default = "default_rr")]
    pub risk_reward_ratio: f64,

    #[serde(default)]
    pub require_unfilled: bool,
    #[serde(default = "default_true")]
    pub skip_forming_candle: bool,
    #[serde(default = "default_coarse_lookback")]
    pub coarse_lookback_hours: i64,
    #[serde(default = "default_fine_lookback")]
    pub fine_lookback_hours: i64,
    #[serde(default = "default_min_price")]
    pub min_current_price: f64,
    #[serde(default = "default_workers")]
    pub workers: usize,

    // value-area breakout scan
    #[serde(default = "default_breakout_fraction")]
    pub breakout_target_fraction: f64,
    #[serde(default = "default_breakout_tf")]
    pub breakout_timeframe: Timeframe,
    /// Only check symbols whose price sits strictly inside a recent gap on
    /// `breakout_gap_timeframe`.
    #[serde(default)]
    pub breakout_gap_filter: bool,
    #[serde(default = "default_breakout_gap_tf")]
    pub breakout_gap_timeframe: Timeframe,

    #[serde(default)]
    pub cache_policy: StalenessPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueAreaSource {
    #[default]
    Coarse,
    Fine,
}

fn default_coarse_tf() -> Timeframe { Timeframe::H1 }
fn default_fine_tf() -> Timeframe { Timeframe::M5 }
fn default_min_gap_coarse() -> f64 { 0.4 }
fn default_min_gap_fine() -> f64 { 0.1 }
fn default_va_fraction() -> f64 { 0.84 }
fn default_va_buckets() -> usize { 100 }
fn default_rr() -> f64 { 2.0 }
fn default_true() -> bool { true }
fn default_coarse_lookback() -> i64 { 24 * 90 }
fn default_fine_lookback() -> i64 { 24 * 7 }
fn default_min_price() -> f64 { 0.000001 }
fn default_workers() -> usize { 4 }
fn default_breakout_fraction() -> f64 { 0.99 }
fn default_breakout_tf() -> Timeframe { Timeframe::H4 }
fn default_breakout_gap_tf() -> Timeframe { Timeframe::D1 }

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            coarse_timeframe: default_coarse_tf(),
            fine_timeframe: default_fine_tf(),
            min_gap_percent_coarse: default_min_gap_coarse(),
            min_gap_percent_fine: default_min_gap_fine(),
            value_area_target_fraction: default_va_fraction(),
            value_area_bucket_count: default_va_buckets(),
            value_area_source: ValueAreaSource::default(),
            apply_value_area_filter: false,
            alignment_policy: AlignmentPolicy::default(),
            alignment_window_secs: None,
            risk_reward_ratio: default_rr(),
            require_unfilled: false,
            skip_forming_candle: default_true(),
            coarse_lookback_hours: default_coarse_lookback(),
            fine_lookback_hours: default_fine_lookback(),
            min_current_price: default_min_price(),
            workers: default_workers(),
            breakout_target_fraction: default_breakout_fraction(),
            breakout_timeframe: default_breakout_tf(),
            breakout_gap_filter: false,
            breakout_gap_timeframe: default_breakout_gap_tf(),
            cache_policy: StalenessPolicy::default(),
        }
    }
}

impl ScreenerConfig {
    /// Defaults overridden by any `FVG_*` variables present.
    pub fn from_env() -> Result<Self, String> {
        let mut cfg = Self::default();
        override_var("FVG_COARSE_TIMEFRAME", &mut cfg.coarse_timeframe)?;
        override_var("FVG_FINE_TIMEFRAME", &mut cfg.fine_timeframe)?;
        override_var("FVG_MIN_GAP_PERCENT_COARSE", &mut cfg.min_gap_percent_coarse)?;
        override_var("FVG_MIN_GAP_PERCENT_FINE", &mut cfg.min_gap_percent_fine)?;
        override_var("FVG_VALUE_AREA_FRACTION", &mut cfg.value_area_target_fraction)?;
        override_var("FVG_VALUE_AREA_BUCKETS", &mut cfg.value_area_bucket_count)?;
        override_var("FVG_APPLY_VALUE_AREA_FILTER", &mut cfg.apply_value_area_filter)?;
        override_var("FVG_RISK_REWARD", &mut cfg.risk_reward_ratio)?;
        override_var("FVG_REQUIRE_UNFILLED", &mut cfg.require_unfilled)?;
        override_var("FVG_SKIP_FORMING_CANDLE", &mut cfg.skip_forming_candle)?;
        override_var("FVG_COARSE_LOOKBACK_HOURS", &mut cfg.coarse_lookback_hours)?;
        override_var("FVG_FINE_LOOKBACK_HOURS", &mut cfg.fine_lookback_hours)?;
        override_var("FVG_WORKERS", &mut cfg.workers)?;
        override_var("FVG_BREAKOUT_GAP_FILTER", &mut cfg.breakout_gap_filter)?;

        if let Ok(raw) = env::var("FVG_ALIGNMENT_WINDOW_SECS") {
            let secs = raw
                .parse::<i64>()
                .map_err(|_| format!("FVG_ALIGNMENT_WINDOW_SECS must be an integer, got '{raw}'"))?;
            cfg.alignment_window_secs = Some(secs);
        }
        if let Ok(raw) = env::var("FVG_ALIGNMENT_POLICY") {
            cfg.alignment_policy = serde_json::from_value(serde_json::Value::String(raw.clone()))
                .map_err(|_| format!("FVG_ALIGNMENT_POLICY: unknown policy '{raw}'"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        let fraction_ok = |f: f64| f > 0.0 && f <= 1.0;
        if !fraction_ok(self.value_area_target_fraction) {
            return Err("value_area_target_fraction must be in (0, 1]".into());
        }
        if !fraction_ok(self.breakout_target_fraction) {
            return Err("breakout_target_fraction must be in (0, 1]".into());
        }
        if self.value_area_bucket_count == 0 {
            return Err("value_area_bucket_count must be positive".into());
        }
        if self.workers == 0 {
            return Err("workers must be positive".into());
        }
        if self.min_gap_percent_coarse < 0.0 || self.min_gap_percent_fine < 0.0 {
            return Err("gap thresholds must not be negative".into());
        }
        if !(self.risk_reward_ratio > 0.0) {
            return Err("risk_reward_ratio must be positive".into());
        }
        if matches!(self.alignment_window_secs, Some(w) if !(0..=MAX_ALIGNMENT_WINDOW_SECS).contains(&w)) {
            return Err(format!("alignment_window_secs must be in 0..={MAX_ALIGNMENT_WINDOW_SECS}"));
        }
        if self.coarse_timeframe <= self.fine_timeframe {
            return Err(format!(
                "coarse timeframe {} must be wider than fine timeframe {}",
                self.coarse_timeframe, self.fine_timeframe
            ));
        }
        let lookback_ok = |h: i64| h > 0 && h <= MAX_LOOKBACK_HOURS;
        if !lookback_ok(self.coarse_lookback_hours) || !lookback_ok(self.fine_lookback_hours) {
            return Err(format!("lookback windows must be in 1..={MAX_LOOKBACK_HOURS} hours"));
        }
        Ok(())
    }

    /// Applies a partial JSON object on top of `self`; fields not named keep
    /// their current value.
    pub fn with_overrides(&self, overrides: &serde_json::Value) -> Result<Self, String> {
        let serde_json::Value::Object(patch) = overrides else {
            return Err("config overrides must be a JSON object".into());
        };
        let mut merged = serde_json::to_value(self).map_err(|e| e.to_string())?;
        if let serde_json::Value::Object(base) = &mut merged {
            for (k, v) in patch {
                base.insert(k.clone(), v.clone());
            }
        }
        let cfg: ScreenerConfig =
            serde_json::from_value(merged).map_err(|e| format!("invalid config: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn alignment_rules(&self) -> AlignmentRules {
        AlignmentRules {
            policy: self.alignment_policy,
            time_window: self.alignment_window_secs.map(chrono::Duration::seconds),
            apply_value_area_filter: self.apply_value_area_filter,
        }
    }
}

fn override_var<T: FromStr>(key: &str, slot: &mut T) -> Result<(), String> {
    match env::var(key) {
        Ok(raw) => {
            *slot = raw
                .trim()
                .parse::<T>()
                .map_err(|_| format!("{key} has an invalid value '{raw}'"))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub market: Market,
    /// Empty means "discover from the exchange".
    pub symbols: Vec<String>,
    pub screen_interval_secs: u64,
    pub results_dir: String,
    pub screener: ScreenerConfig,
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv().ok(); // loads `.env` file automatically

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse::<u16>()
            .map_err(|_| "SERVER_PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let market = env::var("BINANCE_MARKET")
            .unwrap_or_else(|_| "futures".into())
            .parse::<Market>()?;

        let symbols = parse_symbols(&env::var("SCREEN_SYMBOLS").unwrap_or_default());

        let screen_interval_secs = env::var("SCREEN_INTERVAL_SECS")
            .unwrap_or_else(|_| "900".into())
            .parse::<u64>()
            .map_err(|_| "SCREEN_INTERVAL_SECS must be a whole number of seconds")?;

        let results_dir = env::var("RESULTS_DIR").unwrap_or_else(|_| "results".into());
        let screener = ScreenerConfig::from_env()?;

        Ok(Self {
            server_port,
            database_url,
            redis_url,
            market,
            symbols,
            screen_interval_secs,
            results_dir,
            screener,
        })
    }
}

/// Comma separated list, blanks dropped.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
