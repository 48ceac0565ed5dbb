// =============================================================================
// Settings — scanner configuration with serde defaults
// =============================================================================
//
// Loaded from a JSON file at startup. Every field carries `#[serde(default)]`
// so that older config files missing new fields still deserialise. When the
// file is absent the scanner falls back to `Default` (main logs a warning).
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics::AmplitudeFormula;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_max_candles() -> u32 {
    200
}

fn default_intervals() -> Vec<String> {
    vec![
        "1m".to_string(),
        "15m".to_string(),
        "1h".to_string(),
        "4h".to_string(),
        "1d".to_string(),
    ]
}

fn default_ma_windows() -> Vec<usize> {
    vec![7, 21, 50, 100, 200]
}

fn default_refresh_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    50
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// Settings
// =============================================================================

/// Top-level configuration for the volatility scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the Binance REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Quote asset that defines the symbol universe (e.g. "USDT" keeps
    /// BTCUSDT, ETHUSDT, ... and drops everything else).
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Candles requested per fetch. Must cover the largest MA window.
    #[serde(default = "default_max_candles")]
    pub max_candles: u32,

    /// Sampling intervals scanned each cycle.
    #[serde(default = "default_intervals")]
    pub intervals: Vec<String>,

    /// Rolling-average window sizes (in candles) computed per symbol.
    #[serde(default = "default_ma_windows")]
    pub ma_windows: Vec<usize>,

    /// Sleep between refresh cycles, in seconds.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,

    /// Upper bound on concurrent upstream fetches. Tasks are processed in
    /// sequential batches of this size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Address the HTTP API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Per-candle amplitude formula fed into the rolling averages.
    #[serde(default)]
    pub amplitude_formula: AmplitudeFormula,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            quote_asset: default_quote_asset(),
            max_candles: default_max_candles(),
            intervals: default_intervals(),
            ma_windows: default_ma_windows(),
            refresh_secs: default_refresh_secs(),
            batch_size: default_batch_size(),
            bind_addr: default_bind_addr(),
            amplitude_formula: AmplitudeFormula::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;

        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse settings from {}", path.display()))?;

        info!(
            path = %path.display(),
            quote_asset = %settings.quote_asset,
            intervals = ?settings.intervals,
            "settings loaded"
        );

        Ok(settings)
    }

    /// Apply environment-variable overrides. Called once at startup after
    /// loading the file so that deployments can retarget without editing JSON.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("VOLSCAN_BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr;
            }
        }
        if let Ok(quote) = std::env::var("VOLSCAN_QUOTE_ASSET") {
            if !quote.trim().is_empty() {
                self.quote_asset = quote.trim().to_uppercase();
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_have_expected_values() {
        let s = Settings::default();
        assert_eq!(s.quote_asset, "USDT");
        assert_eq!(s.max_candles, 200);
        assert_eq!(s.intervals, vec!["1m", "15m", "1h", "4h", "1d"]);
        assert_eq!(s.ma_windows, vec![7, 21, 50, 100, 200]);
        assert_eq!(s.refresh_secs, 60);
        assert_eq!(s.batch_size, 50);
        assert_eq!(s.amplitude_formula, AmplitudeFormula::HighLowRange);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let s: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.quote_asset, "USDT");
        assert_eq!(s.batch_size, 50);
    }

    #[test]
    fn deserialise_partial_json_keeps_other_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"quote_asset": "BTC", "batch_size": 10}"#).unwrap();
        assert_eq!(s.quote_asset, "BTC");
        assert_eq!(s.batch_size, 10);
        assert_eq!(s.refresh_secs, 60);
    }

    #[test]
    fn settings_round_trip() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.intervals, s.intervals);
        assert_eq!(back.ma_windows, s.ma_windows);
    }
}
