// =============================================================================
// Rolling Volatility Metrics — pure calculator
// =============================================================================
//
// Per-candle amplitude:
//   HighLowRange    = (high - low) / open      (default)
//   CloseOpenChange = |close - open| / open
//
// For each configured window W the calculator emits
//   "maW" = mean(amplitude of the last W candles)
// only when at least W candles are available. A symbol with fewer candles
// than the smallest window produces an empty map — absent, never zero-filled.
//
// The function is deterministic and side-effect-free; the scan pipeline calls
// it once per (symbol, interval) task.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::Candle;

/// Which per-candle quantity feeds the rolling averages.
///
/// Both formulas normalise by the open price so values are comparable across
/// assets with different price scales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmplitudeFormula {
    /// Total intra-candle travel: `(high - low) / open`.
    #[default]
    HighLowRange,
    /// Directional body size: `|close - open| / open`.
    CloseOpenChange,
}

impl AmplitudeFormula {
    /// Amplitude of a single candle. Non-finite for a zero/invalid open,
    /// which poisons (and therefore suppresses) any window containing it.
    fn amplitude(&self, candle: &Candle) -> f64 {
        match self {
            AmplitudeFormula::HighLowRange => (candle.high - candle.low) / candle.open,
            AmplitudeFormula::CloseOpenChange => (candle.close - candle.open).abs() / candle.open,
        }
    }
}

/// Compute the rolling-average amplitude for each window in `windows`.
///
/// # Arguments
/// - `candles` — OHLCV candles, oldest first.
/// - `windows` — rolling-window sizes in candles.
/// - `formula` — per-candle amplitude formula.
///
/// # Returns
/// A map of `"maW" -> mean amplitude` containing an entry only for windows
/// fully covered by the input. Empty when no window qualifies.
pub fn compute(
    candles: &[Candle],
    windows: &[usize],
    formula: AmplitudeFormula,
) -> BTreeMap<String, f64> {
    let mut result = BTreeMap::new();
    if candles.is_empty() {
        return result;
    }

    let amplitudes: Vec<f64> = candles.iter().map(|c| formula.amplitude(c)).collect();

    for &w in windows {
        if w == 0 || amplitudes.len() < w {
            continue;
        }
        let tail = &amplitudes[amplitudes.len() - w..];
        let mean = tail.iter().sum::<f64>() / w as f64;
        if mean.is_finite() {
            result.insert(format!("ma{w}"), mean);
        }
    }

    result
}
