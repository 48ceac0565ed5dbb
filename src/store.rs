// =============================================================================
// Snapshot Store — published metrics + live cycle status
// =============================================================================
//
// Two shared structures with different consistency contracts:
//
//   Snapshot     — the latest fully-computed per-interval metric buckets.
//                  Published with a single Arc swap, so a reader either sees
//                  the whole previous cycle or the whole new one, never a mix.
//
//   CycleStatus  — live progress of the current/most recent cycle. Updated
//                  copy-on-write (clone, mutate, swap) so each read is an
//                  internally-consistent point-in-time record, but readers
//                  are expected to observe mid-cycle values.
//
// The refresh pipeline is the only writer; the HTTP layer only reads.
// =============================================================================

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Maximum number of human-readable progress lines retained.
const MAX_RECENT_LOGS: usize = 30;
/// How many in-flight task labels the status exposes per batch.
pub const MAX_RECENT_SYMBOLS: usize = 10;

// =============================================================================
// Data types
// =============================================================================

/// Computed rolling-volatility statistics for one symbol at one interval.
///
/// `metrics` holds `"maW" -> value` entries only for windows that had enough
/// candles; it is flattened so the wire shape is
/// `{"symbol": "BTCUSDT", "interval": "1h", "ma7": 0.012, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub symbol: String,
    pub interval: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

/// Per-interval metric buckets from one refresh cycle.
pub type Snapshot = HashMap<String, Vec<MetricRecord>>;

/// Live/most-recent cycle metadata. Every field is serialised into the
/// status endpoint payload.
#[derive(Debug, Clone, Serialize)]
pub struct CycleStatus {
    /// True once at least one cycle has published a snapshot.
    pub initialized: bool,
    /// True while a refresh cycle is running.
    pub in_progress: bool,
    /// RFC 3339 timestamp of process start.
    pub startup_time: String,
    /// RFC 3339 timestamp of the last completed cycle (success or not).
    pub last_refresh: Option<String>,
    /// Size of the symbol universe fetched this cycle.
    pub symbol_count: usize,
    /// Published record count per interval, from the most recent cycle.
    pub intervals: BTreeMap<String, usize>,
    /// Errors collected during the current/most recent cycle.
    pub errors: Vec<String>,
    /// Tasks completed so far this cycle.
    pub current_progress: usize,
    /// Total tasks this cycle (|symbols| x |intervals|).
    pub total_tasks: usize,
    /// Labels of tasks in the batch currently in flight (first few only).
    pub recent_symbols: Vec<String>,
    /// Rolling window of recent progress lines, oldest first.
    pub logs: Vec<String>,
}

impl CycleStatus {
    fn new() -> Self {
        Self {
            initialized: false,
            in_progress: false,
            startup_time: Utc::now().to_rfc3339(),
            last_refresh: None,
            symbol_count: 0,
            intervals: BTreeMap::new(),
            errors: Vec::new(),
            current_progress: 0,
            total_tasks: 0,
            recent_symbols: Vec::new(),
            logs: Vec::new(),
        }
    }
}

// =============================================================================
// SnapshotStore
// =============================================================================

/// Owns the published snapshot and the cycle status. Constructed once at
/// startup and shared via `Arc<AppState>`.
pub struct SnapshotStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    status: RwLock<Arc<CycleStatus>>,
    recent_logs: RwLock<VecDeque<String>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            status: RwLock::new(Arc::new(CycleStatus::new())),
            recent_logs: RwLock::new(VecDeque::with_capacity(MAX_RECENT_LOGS)),
        }
    }

    // ── Read side ───────────────────────────────────────────────────────

    /// Records for one interval. Empty when the store is uninitialized or
    /// the interval is unknown — never an error.
    pub fn get_interval(&self, interval: &str) -> Vec<MetricRecord> {
        match self.snapshot.read().as_ref() {
            Some(snap) => snap.get(interval).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// The current published snapshot, if any. Readers hold the returned Arc
    /// and stay on that cycle's data even if a swap happens underneath.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    /// Point-in-time view of the cycle status. Always available, with
    /// `initialized: false` before the first successful cycle.
    pub fn status(&self) -> Arc<CycleStatus> {
        self.status.read().clone()
    }

    // ── Write side (refresh pipeline only) ──────────────────────────────

    /// Atomically publish a new snapshot. Single Arc swap — readers never
    /// observe partial contents.
    pub fn replace(&self, by_interval: Snapshot) {
        *self.snapshot.write() = Some(Arc::new(by_interval));
        self.update_status(|s| s.initialized = true);
    }

    /// Reset per-cycle transient fields and mark a cycle in progress. The
    /// published snapshot and `initialized` flag are left untouched.
    pub fn begin_cycle(&self) {
        self.update_status(|s| {
            s.in_progress = true;
            s.errors.clear();
            s.current_progress = 0;
            s.total_tasks = 0;
            s.recent_symbols.clear();
        });
    }

    /// Mark the cycle finished (success or not).
    pub fn finish_cycle(&self) {
        self.update_status(|s| {
            s.in_progress = false;
            s.recent_symbols.clear();
        });
    }

    /// Stamp `last_refresh` with the current time.
    pub fn mark_refreshed(&self) {
        self.update_status(|s| s.last_refresh = Some(Utc::now().to_rfc3339()));
    }

    pub fn set_symbol_count(&self, count: usize) {
        self.update_status(|s| s.symbol_count = count);
    }

    pub fn set_total_tasks(&self, total: usize) {
        self.update_status(|s| s.total_tasks = total);
    }

    pub fn set_recent_symbols(&self, labels: Vec<String>) {
        self.update_status(|s| s.recent_symbols = labels);
    }

    pub fn advance_progress(&self, completed: usize) {
        self.update_status(|s| s.current_progress += completed);
    }

    pub fn set_interval_count(&self, interval: &str, count: usize) {
        let interval = interval.to_string();
        self.update_status(|s| {
            s.intervals.insert(interval, count);
        });
    }

    /// Record a cycle error for the status payload.
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update_status(|s| s.errors.push(message));
    }

    /// Append a `[HH:MM:SS]`-prefixed line to the rolling progress log
    /// (oldest evicted past capacity) and mirror it into the status payload.
    pub fn log_line(&self, message: &str) {
        let line = format!("[{}] {}", Utc::now().format("%H:%M:%S"), message);
        let snapshot: Vec<String> = {
            let mut ring = self.recent_logs.write();
            if ring.len() == MAX_RECENT_LOGS {
                ring.pop_front();
            }
            ring.push_back(line);
            ring.iter().cloned().collect()
        };
        self.update_status(|s| s.logs = snapshot);
        info!("{message}");
    }

    /// Copy-on-write status update: clone, mutate, swap. Readers holding the
    /// previous Arc keep a consistent view; new readers see all of this
    /// update or none of it.
    fn update_status(&self, mutate: impl FnOnce(&mut CycleStatus)) {
        let mut guard = self.status.write();
        let mut next = (**guard).clone();
        mutate(&mut next);
        *guard = Arc::new(next);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, interval: &str, ma7: f64) -> MetricRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert("ma7".to_string(), ma7);
        MetricRecord {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            metrics,
        }
    }

    #[test]
    fn uninitialized_interval_is_empty_not_error() {
        let store = SnapshotStore::new();
        assert!(store.get_interval("1h").is_empty());
        assert!(!store.status().initialized);
    }

    #[test]
    fn unknown_interval_is_empty_after_publish() {
        let store = SnapshotStore::new();
        let mut snap = Snapshot::new();
        snap.insert("1h".to_string(), vec![record("BTCUSDT", "1h", 0.01)]);
        store.replace(snap);

        assert_eq!(store.get_interval("1h").len(), 1);
        assert!(store.get_interval("4h").is_empty());
        assert!(store.status().initialized);
    }

    #[test]
    fn replace_swaps_whole_snapshot() {
        let store = SnapshotStore::new();

        let mut first = Snapshot::new();
        first.insert("1h".to_string(), vec![record("AAAUSDT", "1h", 0.1)]);
        store.replace(first);

        // A reader holding the old Arc keeps the old cycle's data intact
        // even after the writer swaps in a new snapshot.
        let held = store.snapshot().unwrap();

        let mut second = Snapshot::new();
        second.insert("1h".to_string(), vec![record("BBBUSDT", "1h", 0.2)]);
        store.replace(second);

        assert_eq!(held.get("1h").unwrap()[0].symbol, "AAAUSDT");
        assert_eq!(store.get_interval("1h")[0].symbol, "BBBUSDT");
    }

    #[test]
    fn status_updates_are_copy_on_write() {
        let store = SnapshotStore::new();
        store.set_total_tasks(100);

        let before = store.status();
        store.advance_progress(50);
        let after = store.status();

        assert_eq!(before.current_progress, 0);
        assert_eq!(after.current_progress, 50);
        assert_eq!(after.total_tasks, 100);
    }

    #[test]
    fn begin_cycle_resets_transients_but_not_snapshot() {
        let store = SnapshotStore::new();
        let mut snap = Snapshot::new();
        snap.insert("1h".to_string(), vec![record("BTCUSDT", "1h", 0.01)]);
        store.replace(snap);

        store.record_error("boom");
        store.advance_progress(3);
        store.begin_cycle();

        let status = store.status();
        assert!(status.in_progress);
        assert!(status.errors.is_empty());
        assert_eq!(status.current_progress, 0);
        assert!(status.initialized);
        assert_eq!(store.get_interval("1h").len(), 1);
    }

    #[test]
    fn log_ring_evicts_oldest_past_capacity() {
        let store = SnapshotStore::new();
        for i in 0..(MAX_RECENT_LOGS + 5) {
            store.log_line(&format!("line {i}"));
        }
        let logs = &store.status().logs;
        assert_eq!(logs.len(), MAX_RECENT_LOGS);
        assert!(logs[0].ends_with("line 5"));
        assert!(logs.last().unwrap().ends_with(&format!(
            "line {}",
            MAX_RECENT_LOGS + 4
        )));
    }

    #[test]
    fn metric_record_serialises_flat() {
        let rec = record("BTCUSDT", "1h", 0.0123);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["interval"], "1h");
        assert!((json["ma7"].as_f64().unwrap() - 0.0123).abs() < 1e-12);
    }
}
