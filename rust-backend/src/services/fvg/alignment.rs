//! ─── Coarse / fine gap alignment ───────────────────────────────────────────
//!
//! A coarse gap aligns with a fine gap when the chosen coarse boundary lies in
//! the fine gap's closed range. Optional gates:
//! * anchors no further apart than a time window
//! * fine gap outside the value area (bullish below `low`, bearish above `high`)

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::common::GapKind;
use super::gap::Fvg;
use super::value_area::ValueArea;

/// Which coarse boundary is tested against the fine range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    UpperLine,
    LowerLine,
    EitherLine,
    /// Upper line of a bullish coarse gap, lower line of a bearish one.
    #[default]
    CoarseKind,
    /// Upper line when the fine gap is bullish, lower line when bearish.
    FineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Upper,
    Lower,
}

impl AlignmentPolicy {
    fn boundaries(&self, coarse: &Fvg, fine: &Fvg) -> &'static [Boundary] {
        const UPPER: &[Boundary] = &[Boundary::Upper];
        const LOWER: &[Boundary] = &[Boundary::Lower];
        const EITHER: &[Boundary] = &[Boundary::Upper, Boundary::Lower];

        let by_kind = |k: GapKind| match k {
            GapKind::Bullish => UPPER,
            GapKind::Bearish => LOWER,
        };
        match self {
            AlignmentPolicy::UpperLine => UPPER,
            AlignmentPolicy::LowerLine => LOWER,
            AlignmentPolicy::EitherLine => EITHER,
            AlignmentPolicy::CoarseKind => by_kind(coarse.kind),
            AlignmentPolicy::FineKind => by_kind(fine.kind),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlignmentRules {
    pub policy: AlignmentPolicy,
    /// Max distance between anchors (inclusive).
    pub time_window: Option<Duration>,
    pub apply_value_area_filter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedPair {
    pub coarse: Fvg,
    pub fine: Fvg,
    pub aligned_on: Boundary,
}

/// Cross product of `coarse` × `fine`, one entry per qualifying pair, in
/// coarse-major order.
///
/// The value-area gate only runs when the rules enable it *and* an area is
/// supplied; a missing area skips the gate.
pub fn align(
    coarse: &[Fvg],
    fine: &[Fvg],
    rules: &AlignmentRules,
    value_area: Option<&ValueArea>,
) -> Vec<AlignedPair> {
    let gate = value_area.filter(|_| rules.apply_value_area_filter);
    let mut out = Vec::new();

    for c in coarse {
        for f in fine {
            if let Some(window) = rules.time_window {
                if (f.anchor_timestamp - c.anchor_timestamp).abs() > window {
                    continue;
                }
            }
            if let Some(va) = gate {
                if !outside_value_area(f, va) {
                    continue;
                }
            }
            let hit = rules.policy.boundaries(c, f).iter().copied().find(|b| {
                let line = match b {
                    Boundary::Upper => c.upper_line,
                    Boundary::Lower => c.lower_line,
                };
                f.contains(line)
            });
            if let Some(aligned_on) = hit {
                out.push(AlignedPair { coarse: *c, fine: *f, aligned_on });
            }
        }
    }
    out
}

fn outside_value_area(fine: &Fvg, va: &ValueArea) -> bool {
    match fine.kind {
        GapKind::Bullish => fine.upper_line < va.low,
        GapKind::Bearish => fine.lower_line > va.high,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 28, 12, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn gap(kind: GapKind, lower: f64, upper: f64, min: i64) -> Fvg {
        Fvg {
            kind,
            upper_line: upper,
            lower_line: lower,
            anchor_timestamp: at(min),
            gap_percent: (upper - lower) / lower * 100.0,
            middle_high: upper,
            middle_low: lower,
        }
    }

    fn rules(policy: AlignmentPolicy) -> AlignmentRules {
        AlignmentRules { policy, ..Default::default() }
    }

    // ───────────────────────────────────────── Boundary policy
    #[test]
    fn coarse_kind_picks_upper_for_bullish_and_lower_for_bearish() {
        let bull_c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let bear_c = gap(GapKind::Bearish, 97.0, 98.0, 0);
        let around_upper = gap(GapKind::Bullish, 97.8, 98.3, 5);
        let around_lower = gap(GapKind::Bearish, 96.5, 97.2, 5);
        let r = rules(AlignmentPolicy::CoarseKind);

        let got = align(&[bull_c], &[around_upper, around_lower], &r, None);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].fine, around_upper);
        assert_eq!(got[0].aligned_on, Boundary::Upper);

        let got = align(&[bear_c], &[around_upper, around_lower], &r, None);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].fine, around_lower);
        assert_eq!(got[0].aligned_on, Boundary::Lower);
    }

    #[test]
    fn fine_kind_follows_the_fine_gap() {
        let c = gap(GapKind::Bearish, 97.0, 98.0, 0);
        let bullish_over_upper = gap(GapKind::Bullish, 97.8, 98.3, 5);
        let got = align(&[c], &[bullish_over_upper], &rules(AlignmentPolicy::FineKind), None);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].aligned_on, Boundary::Upper);
        assert!(align(&[c], &[bullish_over_upper], &rules(AlignmentPolicy::CoarseKind), None).is_empty());
    }

    #[test]
    fn explicit_lines_and_either() {
        let c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let over_lower = gap(GapKind::Bullish, 96.9, 97.1, 5);
        let fine = [over_lower];
        assert!(align(&[c], &fine, &rules(AlignmentPolicy::UpperLine), None).is_empty());
        assert_eq!(align(&[c], &fine, &rules(AlignmentPolicy::LowerLine), None).len(), 1);
        let either = align(&[c], &fine, &rules(AlignmentPolicy::EitherLine), None);
        assert_eq!(either.len(), 1);
        assert_eq!(either[0].aligned_on, Boundary::Lower);
    }

    #[test]
    fn interval_is_closed() {
        let c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let ends_on_line = gap(GapKind::Bullish, 97.5, 98.0, 5);
        let starts_on_line = gap(GapKind::Bullish, 98.0, 98.5, 5);
        let r = rules(AlignmentPolicy::UpperLine);
        assert_eq!(align(&[c], &[ends_on_line, starts_on_line], &r, None).len(), 2);
    }

    // ───────────────────────────────────────── Cross product
    #[test]
    fn one_entry_per_pair_both_ways() {
        let c1 = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let c2 = gap(GapKind::Bullish, 96.0, 98.1, 60);
        let f1 = gap(GapKind::Bullish, 97.9, 98.2, 5);
        let f2 = gap(GapKind::Bullish, 97.95, 98.15, 10);
        let got = align(&[c1, c2], &[f1, f2], &rules(AlignmentPolicy::UpperLine), None);
        let ids: Vec<(i64, i64)> = got
            .iter()
            .map(|p| {
                (
                    (p.coarse.anchor_timestamp - at(0)).num_minutes(),
                    (p.fine.anchor_timestamp - at(0)).num_minutes(),
                )
            })
            .collect();
        assert_eq!(ids, vec![(0, 5), (0, 10), (60, 5), (60, 10)]);
    }

    #[test]
    fn empty_inputs_give_empty_output() {
        let c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let r = AlignmentRules::default();
        assert!(align(&[], &[c], &r, None).is_empty());
        assert!(align(&[c], &[], &r, None).is_empty());
    }

    // ───────────────────────────────────────── Gates
    #[test]
    fn time_window_is_inclusive() {
        let c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let on_edge = gap(GapKind::Bullish, 97.8, 98.3, 60);
        let before = gap(GapKind::Bullish, 97.8, 98.3, -61);
        let r = AlignmentRules {
            policy: AlignmentPolicy::UpperLine,
            time_window: Some(Duration::hours(1)),
            apply_value_area_filter: false,
        };
        let got = align(&[c], &[on_edge, before], &r, None);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].fine, on_edge);
    }

    #[test]
    fn value_area_gate_needs_fine_gap_outside_band() {
        let c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let f = gap(GapKind::Bullish, 97.8, 98.3, 5);
        let above = ValueArea { high: 105.0, low: 99.0, point_of_control: 100.0 };
        let around = ValueArea { high: 100.0, low: 95.0, point_of_control: 97.0 };
        let r = AlignmentRules { apply_value_area_filter: true, ..Default::default() };

        assert_eq!(align(&[c], &[f], &r, Some(&above)).len(), 1);
        assert!(align(&[c], &[f], &r, Some(&around)).is_empty());
        // no area available: gate skipped
        assert_eq!(align(&[c], &[f], &r, None).len(), 1);
    }

    #[test]
    fn bearish_fine_gap_must_sit_above_value_area() {
        let c = gap(GapKind::Bearish, 101.0, 102.0, 0);
        let f = gap(GapKind::Bearish, 100.5, 101.5, 5);
        let below = ValueArea { high: 100.0, low: 90.0, point_of_control: 95.0 };
        let touching = ValueArea { high: 100.5, low: 90.0, point_of_control: 95.0 };
        let r = AlignmentRules { apply_value_area_filter: true, ..Default::default() };
        assert_eq!(align(&[c], &[f], &r, Some(&below)).len(), 1);
        assert!(align(&[c], &[f], &r, Some(&touching)).is_empty());
    }

    #[test]
    fn disabled_gate_ignores_rejecting_value_area() {
        let c = gap(GapKind::Bullish, 97.0, 98.0, 0);
        let f = gap(GapKind::Bullish, 97.8, 98.3, 5);
        let rejecting = ValueArea { high: 100.0, low: 95.0, point_of_control: 97.0 };
        let r = AlignmentRules::default();
        assert_eq!(align(&[c], &[f], &r, Some(&rejecting)).len(), 1);
    }

    // ───────────────────────────────────────── Scaling
    #[test]
    fn decision_survives_price_rescaling() {
        let scale = |g: Fvg, k: f64| Fvg {
            upper_line: g.upper_line * k,
            lower_line: g.lower_line * k,
            middle_high: g.middle_high * k,
            middle_low: g.middle_low * k,
            ..g
        };
        let coarse = [gap(GapKind::Bullish, 97.0, 98.0, 0), gap(GapKind::Bearish, 90.0, 91.0, 0)];
        let fine = [
            gap(GapKind::Bullish, 97.5, 98.5, 5),
            gap(GapKind::Bearish, 89.5, 90.25, 5),
            gap(GapKind::Bullish, 99.0, 99.5, 5),
        ];
        for policy in [
            AlignmentPolicy::UpperLine,
            AlignmentPolicy::LowerLine,
            AlignmentPolicy::EitherLine,
            AlignmentPolicy::CoarseKind,
            AlignmentPolicy::FineKind,
        ] {
            let base = align(&coarse, &fine, &rules(policy), None).len();
            for k in [0.001, 0.5, 4.0, 1024.0] {
                let c: Vec<Fvg> = coarse.iter().map(|g| scale(*g, k)).collect();
                let f: Vec<Fvg> = fine.iter().map(|g| scale(*g, k)).collect();
                assert_eq!(align(&c, &f, &rules(policy), None).len(), base, "{policy:?} x{k}");
            }
        }
    }
}
