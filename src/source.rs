// =============================================================================
// Candle Source — upstream market-data seam
// =============================================================================
//
// The refresh pipeline only ever talks to the upstream provider through this
// trait, which keeps the pipeline testable with an in-memory mock. The live
// implementation is `binance::client::BinanceClient`.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single OHLCV candle as returned by the upstream klines endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Read-only access to the upstream market-data provider.
///
/// Implementations surface transient network/parse failures as errors and do
/// no caching of their own; per-request timeouts live inside the
/// implementation's HTTP client.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Every currently-trading symbol quoted in the configured quote asset.
    async fn list_active_symbols(&self) -> Result<Vec<String>>;

    /// Up to `limit` most recent candles for `symbol` at `interval`,
    /// oldest-first.
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;
}
