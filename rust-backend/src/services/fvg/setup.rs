// src/services/fvg/setup.rs
use serde::{Deserialize, Serialize};

use super::alignment::{AlignedPair, Boundary};
use super::common::{Candle, GapKind};
use super::gap::Fvg;
use super::value_area::ValueArea;

pub const DEFAULT_RISK_REWARD: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: GapKind,
    pub current_price: f64,
    pub coarse_fvg: Fvg,
    pub fine_fvg: Fvg,
    pub stop_loss: f64,
    pub risk_reward: f64,
    pub aligned_on: Boundary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_area: Option<ValueArea>,
}

/// Direction comes from the fine gap. The stop sits on the far extreme of
/// `stop_loss_source` (the fine middle candle): its low when long, its high
/// when short.
pub fn assemble(
    symbol: &str,
    pair: &AlignedPair,
    current_price: f64,
    stop_loss_source: &Candle,
    value_area: Option<ValueArea>,
    risk_reward: f64,
) -> Setup {
    let kind = pair.fine.kind;
    let stop_loss = match kind {
        GapKind::Bullish => stop_loss_source.low,
        GapKind::Bearish => stop_loss_source.high,
    };
    Setup {
        symbol: symbol.to_string(),
        kind,
        current_price,
        coarse_fvg: pair.coarse,
        fine_fvg: pair.fine,
        stop_loss,
        risk_reward,
        aligned_on: pair.aligned_on,
        value_area,
    }
}

/// Middle-candle stand-in rebuilt from the extremes an [`Fvg`] keeps.
pub fn middle_candle(fvg: &Fvg) -> Candle {
    Candle {
        ts: fvg.anchor_timestamp,
        open: fvg.middle_low,
        high: fvg.middle_high,
        low: fvg.middle_low,
        close: fvg.middle_high,
        volume: 0.0,
    }
}
