// =============================================================================
// Request Statistics — upstream API usage tracking
// =============================================================================
//
// A full scan issues |symbols| x |intervals| klines requests per cycle, so
// keeping an eye on Binance's request-weight budget matters:
//   - Request weight: 1200 per minute; we warn well before that.
//
// The tracker reads the `X-MBX-USED-WEIGHT-1M` response header after every
// request and keeps atomic counters that any thread may query lock-free. The
// aggregate call counters feed the status endpoint.
// =============================================================================

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

/// Soft warning threshold for the 1-minute request weight.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

/// Thread-safe request tracker backed by atomic counters.
pub struct RequestStats {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    total_response_ms: AtomicU64,
    used_weight_1m: AtomicU32,
}

/// Immutable view of the current request statistics, serialised into the
/// status endpoint payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub avg_response_ms: f64,
    pub used_weight_1m: u32,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            total_response_ms: AtomicU64::new(0),
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Record a completed request that returned a usable response.
    pub fn record_success(&self, elapsed_ms: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.successful_calls.fetch_add(1, Ordering::Relaxed);
        self.total_response_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    /// Record a request that failed on the wire or returned an error status.
    pub fn record_failure(&self, elapsed_ms: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        self.total_response_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    /// Update the weight gauge from the HTTP response headers returned by
    /// Binance. The relevant header is `X-MBX-USED-WEIGHT-1M`.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(val) = headers.get("X-MBX-USED-WEIGHT-1M") {
            if let Ok(s) = val.to_str() {
                if let Ok(w) = s.parse::<u32>() {
                    let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
                    if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
                        warn!(
                            used_weight = w,
                            "request weight crossed warning threshold"
                        );
                    }
                    debug!(used_weight_1m = w, "request weight updated from header");
                }
            }
        }
    }

    /// Current statistics as a serialisable snapshot.
    pub fn snapshot(&self) -> RequestStatsSnapshot {
        let total = self.total_calls.load(Ordering::Relaxed);
        let total_ms = self.total_response_ms.load(Ordering::Relaxed);
        let avg_response_ms = if total > 0 {
            total_ms as f64 / total as f64
        } else {
            0.0
        };

        RequestStatsSnapshot {
            total_calls: total,
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            avg_response_ms,
            used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed),
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}
