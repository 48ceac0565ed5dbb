// =============================================================================
// Shared Application State
// =============================================================================
//
// One explicitly-constructed handle tying the scanner together: the refresh
// pipeline writes through `store`, the HTTP layer reads from it, and both
// reach the upstream provider only through the `source` seam. No ambient
// globals — everything is injected here at startup and shared as
// `Arc<AppState>`.
// =============================================================================

use std::sync::Arc;

use crate::binance::RequestStats;
use crate::config::Settings;
use crate::source::CandleSource;
use crate::store::SnapshotStore;

/// Shared state for the scanner process.
pub struct AppState {
    /// Immutable process configuration.
    pub settings: Settings,
    /// Published snapshot + live cycle status. The refresh pipeline is the
    /// only writer; the HTTP layer only reads.
    pub store: SnapshotStore,
    /// Upstream market-data seam (live Binance client, mock in tests).
    pub source: Arc<dyn CandleSource>,
    /// Upstream request statistics, surfaced in the status payload.
    pub request_stats: Arc<RequestStats>,
    /// Process start, for uptime reporting.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        source: Arc<dyn CandleSource>,
        request_stats: Arc<RequestStats>,
    ) -> Self {
        Self {
            settings,
            store: SnapshotStore::new(),
            source,
            request_stats,
            start_time: std::time::Instant::now(),
        }
    }
}
