// tests/engine.rs
use chrono::{DateTime, Duration, TimeZone, Utc};

use fvg_screener::services::fvg::{
    align, assemble, detect, value_area, AlignmentPolicy, AlignmentRules, Boundary, Candle,
    CandleSeries, GapKind, ValueArea,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
}

fn series(step: Duration, rows: &[(f64, f64, f64, f64)]) -> CandleSeries {
    CandleSeries::new(
        rows.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                ts: t0() + step * i as i32,
                open,
                high,
                low,
                close,
                volume: 10.0 + i as f64,
            })
            .collect(),
    )
    .unwrap()
}

/// Closes 100, 95, 90, 98, 99, 101; candle 3's low (98) clears candle 1's high (97).
fn coarse() -> CandleSeries {
    series(
        Duration::hours(1),
        &[
            (99.0, 101.0, 96.0, 100.0),
            (96.5, 97.0, 94.0, 95.0),
            (89.0, 96.0, 88.0, 90.0),
            (98.5, 99.5, 98.0, 98.0),
            (98.0, 100.0, 97.0, 99.0),
            (100.0, 102.0, 99.0, 101.0),
        ],
    )
}

fn fine() -> CandleSeries {
    series(
        Duration::minutes(5),
        &[(96.8, 97.5, 96.5, 97.2), (97.3, 98.4, 97.2, 98.2), (98.4, 99.0, 98.3, 98.8)],
    )
}

#[test]
fn coarse_series_has_one_known_gap() {
    let gaps: Vec<_> = detect(&coarse(), 0.4).collect();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].kind, GapKind::Bullish);
    assert_eq!((gaps[0].lower_line, gaps[0].upper_line), (97.0, 98.0));
    assert_eq!(gaps[0].anchor_timestamp, coarse().candles()[2].ts);
}

#[test]
fn end_to_end_bullish_setup() {
    let coarse_s = coarse();
    let fine_s = fine();
    let c: Vec<_> = detect(&coarse_s, 0.4).collect();
    let f: Vec<_> = detect(&fine_s, 0.1).collect();

    let pairs = align(&c, &f, &AlignmentRules::default(), None);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].aligned_on, Boundary::Upper);

    let middle = fine_s.find(pairs[0].fine.anchor_timestamp).unwrap();
    let setup = assemble("BTCUSDT", &pairs[0], 98.6, middle, None, 2.0);
    assert_eq!(setup.kind, GapKind::Bullish);
    assert_eq!(setup.stop_loss, 97.2);
    assert_eq!(setup.stop_loss, middle.low);
}

#[test]
fn value_area_is_ignored_unless_enabled() {
    let c: Vec<_> = detect(&coarse(), 0.4).collect();
    let f: Vec<_> = detect(&fine(), 0.1).collect();
    // fine gap [97.5, 98.3] sits inside this band
    let rejecting = ValueArea { high: 101.0, low: 90.0, point_of_control: 95.0 };

    let off = AlignmentRules::default();
    assert_eq!(align(&c, &f, &off, Some(&rejecting)).len(), 1);

    let on = AlignmentRules { apply_value_area_filter: true, ..Default::default() };
    assert!(align(&c, &f, &on, Some(&rejecting)).is_empty());

    let below_band = ValueArea { high: 110.0, low: 99.0, point_of_control: 105.0 };
    assert_eq!(align(&c, &f, &on, Some(&below_band)).len(), 1);

    // no area supplied: gate skipped
    assert_eq!(align(&c, &f, &on, None).len(), 1);
}

#[test]
fn computed_value_area_contains_poc() {
    let va = value_area::compute(&coarse(), 0.84, 100).unwrap();
    assert!(va.low <= va.point_of_control && va.point_of_control <= va.high);
    assert!(va.low >= 90.0 && va.high <= 101.0);
}

#[test]
fn fine_kind_policy_matches_coarse_kind_here() {
    let c: Vec<_> = detect(&coarse(), 0.4).collect();
    let f: Vec<_> = detect(&fine(), 0.1).collect();
    let rules = AlignmentRules { policy: AlignmentPolicy::FineKind, ..Default::default() };
    assert_eq!(align(&c, &f, &rules, None).len(), 1);

    let rules = AlignmentRules { policy: AlignmentPolicy::LowerLine, ..Default::default() };
    assert!(align(&c, &f, &rules, None).is_empty());
}
