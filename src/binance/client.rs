// =============================================================================
// Binance REST API Client — public market-data endpoints
// =============================================================================
//
// Only unauthenticated endpoints are used: exchangeInfo for the symbol
// universe and klines for candle history. One shared reqwest client (and its
// connection pool) serves every request with a 10-second timeout, which is
// the only per-task time bound the scan pipeline relies on.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::binance::stats::RequestStats;
use crate::source::{Candle, CandleSource};

/// Binance REST API client for public market data.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    quote_asset: String,
    client: reqwest::Client,
    stats: Arc<RequestStats>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient`.
    ///
    /// # Arguments
    /// * `base_url`    — e.g. "https://api.binance.com".
    /// * `quote_asset` — quote asset the symbol universe is filtered by.
    /// * `stats`       — shared request tracker, also read by the status API.
    pub fn new(
        base_url: impl Into<String>,
        quote_asset: impl Into<String>,
        stats: Arc<RequestStats>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        let base_url = base_url.into();
        debug!(base_url = %base_url, "BinanceClient initialised");

        Self {
            base_url,
            quote_asset: quote_asset.into(),
            client,
            stats,
        }
    }

    // -------------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------------

    /// Issue a GET request and parse the JSON body, recording timing, outcome,
    /// and the used-weight header into the request tracker.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let started = Instant::now();

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.stats
                    .record_failure(started.elapsed().as_millis() as u64);
                return Err(e).with_context(|| format!("GET {url} request failed"));
            }
        };

        self.stats.update_from_headers(resp.headers());
        let status = resp.status();

        let body: serde_json::Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                self.stats
                    .record_failure(started.elapsed().as_millis() as u64);
                return Err(e).with_context(|| format!("failed to parse response from {url}"));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !status.is_success() {
            self.stats.record_failure(elapsed_ms);
            anyhow::bail!("Binance GET {url} returned {status}: {body}");
        }

        self.stats.record_success(elapsed_ms);
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Parsing helpers
    // -------------------------------------------------------------------------

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }

    /// Parse one kline entry from Binance's array-of-arrays response.
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades, ...
    fn parse_kline_row(entry: &serde_json::Value) -> Result<Candle> {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 7 {
            anyhow::bail!("malformed kline entry with {} elements", arr.len());
        }

        Ok(Candle::new(
            arr[0].as_i64().unwrap_or(0),
            Self::parse_str_f64(&arr[1])?,
            Self::parse_str_f64(&arr[2])?,
            Self::parse_str_f64(&arr[3])?,
            Self::parse_str_f64(&arr[4])?,
            Self::parse_str_f64(&arr[5])?,
            arr[6].as_i64().unwrap_or(0),
        ))
    }

    /// Filter the exchangeInfo symbol list down to the active universe:
    /// currently trading and quoted in our quote asset.
    fn filter_universe(body: &serde_json::Value, quote_asset: &str) -> Result<Vec<String>> {
        let entries = body["symbols"]
            .as_array()
            .context("exchangeInfo response missing 'symbols' array")?;

        let symbols = entries
            .iter()
            .filter(|s| {
                s["status"].as_str() == Some("TRADING")
                    && s["quoteAsset"].as_str() == Some(quote_asset)
            })
            .filter_map(|s| s["symbol"].as_str().map(str::to_string))
            .collect();

        Ok(symbols)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    /// GET /api/v3/exchangeInfo, filtered to the active universe.
    #[instrument(skip(self), name = "binance::list_active_symbols")]
    async fn list_active_symbols(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = self.get_json(&url).await?;

        let symbols = Self::filter_universe(&body, &self.quote_asset)?;
        debug!(count = symbols.len(), quote_asset = %self.quote_asset, "symbol universe fetched");
        Ok(symbols)
    }

    /// GET /api/v3/klines — up to `limit` candles, oldest first.
    #[instrument(skip(self), name = "binance::fetch_candles")]
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let body = self.get_json(&url).await?;

        let raw = body.as_array().context("klines response is not an array")?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            match Self::parse_kline_row(entry) {
                Ok(candle) => candles.push(candle),
                Err(e) => {
                    warn!(symbol, interval, error = %e, "skipping malformed kline entry");
                }
            }
        }

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("quote_asset", &self.quote_asset)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_str_f64_accepts_both_shapes() {
        assert_eq!(BinanceClient::parse_str_f64(&json!("1.25")).unwrap(), 1.25);
        assert_eq!(BinanceClient::parse_str_f64(&json!(2.5)).unwrap(), 2.5);
        assert!(BinanceClient::parse_str_f64(&json!(null)).is_err());
        assert!(BinanceClient::parse_str_f64(&json!("abc")).is_err());
    }

    #[test]
    fn parse_kline_row_maps_fields() {
        let row = json!([
            1700000000000i64,
            "100.0",
            "105.5",
            "99.0",
            "103.0",
            "1234.5",
            1700000059999i64,
            "127000.0",
            420,
            "600.0",
            "61800.0",
            "0"
        ]);
        let candle = BinanceClient::parse_kline_row(&row).unwrap();
        assert_eq!(candle.open_time, 1700000000000);
        assert_eq!(candle.close_time, 1700000059999);
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 105.5);
        assert_eq!(candle.low, 99.0);
        assert_eq!(candle.close, 103.0);
        assert_eq!(candle.volume, 1234.5);
    }

    #[test]
    fn parse_kline_row_rejects_short_entries() {
        assert!(BinanceClient::parse_kline_row(&json!([1, "2", "3"])).is_err());
        assert!(BinanceClient::parse_kline_row(&json!("not an array")).is_err());
    }

    #[test]
    fn filter_universe_keeps_trading_quote_matches_only() {
        let body = json!({
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING", "quoteAsset": "USDT"},
                {"symbol": "ETHBTC", "status": "TRADING", "quoteAsset": "BTC"},
                {"symbol": "LUNAUSDT", "status": "BREAK", "quoteAsset": "USDT"},
                {"symbol": "SOLUSDT", "status": "TRADING", "quoteAsset": "USDT"}
            ]
        });
        let symbols = BinanceClient::filter_universe(&body, "USDT").unwrap();
        assert_eq!(symbols, vec!["BTCUSDT", "SOLUSDT"]);
    }

    #[test]
    fn filter_universe_requires_symbols_array() {
        assert!(BinanceClient::filter_universe(&json!({}), "USDT").is_err());
    }
}
