// =============================================================================
// Refresh Cycle — bulk fetch + compute + atomic publish
// =============================================================================
//
// One cycle:
//   1. Fetch the symbol universe. A failure here aborts the cycle and leaves
//      the previous snapshot untouched.
//   2. Cross symbols x intervals into the task set.
//   3. Run the tasks in sequential batches; within a batch every
//      fetch-candles -> compute-metrics task runs concurrently. The batch
//      size caps simultaneous upstream requests.
//   4. Per-task failures are counted and isolated; a symbol with too few
//      candles is a valid empty result, not an error.
//   5. Bucket successes by interval and publish with a single snapshot swap,
//      but only when at least one bucket is non-empty — a stale snapshot
//      beats an empty one.
//
// No error from a task aborts its batch, no batch aborts the cycle, and the
// scheduler never lets a cycle error kill the loop.
// =============================================================================

use futures_util::future::join_all;
use tracing::{error, warn};

use crate::app_state::AppState;
use crate::metrics;
use crate::source::CandleSource;
use crate::store::{MetricRecord, Snapshot, MAX_RECENT_SYMBOLS};

/// Outcome of one (symbol, interval) task.
enum TaskOutcome {
    /// Enough candles for at least one window.
    Record(MetricRecord),
    /// Fetched fine, but fewer candles than the smallest window. Dropped
    /// silently.
    Insufficient,
    /// Upstream fetch failed. Counted, excluded, never aborts the batch.
    Failed(String),
}

/// Fetch candles for one (symbol, interval) pair and compute its metrics.
async fn run_task(state: &AppState, symbol: &str, interval: &str) -> TaskOutcome {
    let candles = match state
        .source
        .fetch_candles(symbol, interval, state.settings.max_candles)
        .await
    {
        Ok(candles) => candles,
        Err(e) => return TaskOutcome::Failed(format!("{symbol}:{interval}: {e:#}")),
    };

    let computed = metrics::compute(
        &candles,
        &state.settings.ma_windows,
        state.settings.amplitude_formula,
    );

    if computed.is_empty() {
        return TaskOutcome::Insufficient;
    }

    TaskOutcome::Record(MetricRecord {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        metrics: computed,
    })
}

/// Run one full refresh cycle.
///
/// All expected failure modes (universe fetch, per-task fetch) are captured
/// into the cycle status here; the `Result` exists for the scheduler's
/// defensive boundary and is `Ok` on every path this function knows about.
pub async fn run_cycle(state: &AppState) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let store = &state.store;
    store.begin_cycle();

    // ── 1. Symbol universe ──────────────────────────────────────────────
    let symbols = match state.source.list_active_symbols().await {
        Ok(symbols) => symbols,
        Err(e) => {
            let msg = format!("failed to fetch symbol universe: {e:#}");
            error!("{msg}");
            store.record_error(msg.clone());
            store.log_line(&format!("ERROR: {msg}"));
            store.finish_cycle();
            return Ok(());
        }
    };

    store.set_symbol_count(symbols.len());
    store.log_line(&format!("Fetched {} symbols from Binance", symbols.len()));

    // ── 2. Task set: full symbols x intervals cross product ─────────────
    let tasks: Vec<(String, String)> = symbols
        .iter()
        .flat_map(|sym| {
            state
                .settings
                .intervals
                .iter()
                .map(move |ivl| (sym.clone(), ivl.clone()))
        })
        .collect();
    store.set_total_tasks(tasks.len());

    // ── 3. Sequential batches, concurrent within a batch ────────────────
    let batch_size = state.settings.batch_size.max(1);
    let batch_count = tasks.len().div_ceil(batch_size);
    let mut outcomes: Vec<TaskOutcome> = Vec::with_capacity(tasks.len());

    for (batch_idx, batch) in tasks.chunks(batch_size).enumerate() {
        store.log_line(&format!(
            "Processing batch {}/{} ({} tasks)",
            batch_idx + 1,
            batch_count,
            batch.len()
        ));
        store.set_recent_symbols(
            batch
                .iter()
                .take(MAX_RECENT_SYMBOLS)
                .map(|(sym, ivl)| format!("{sym}:{ivl}"))
                .collect(),
        );

        let batch_results =
            join_all(batch.iter().map(|(sym, ivl)| run_task(state, sym, ivl))).await;
        outcomes.extend(batch_results);

        store.advance_progress(batch.len());
        let status = store.status();
        store.log_line(&format!(
            "Progress: {}/{} tasks completed",
            status.current_progress, status.total_tasks
        ));
    }

    // ── 4. Failure accounting ───────────────────────────────────────────
    let error_count = outcomes
        .iter()
        .filter(|o| matches!(o, TaskOutcome::Failed(_)))
        .count();
    if error_count > 0 {
        store.record_error(format!("{error_count} tasks failed to fetch"));
        store.log_line(&format!("WARNING: {error_count} tasks failed with errors"));
        for outcome in &outcomes {
            if let TaskOutcome::Failed(msg) = outcome {
                warn!("task failed: {msg}");
            }
        }
    }

    // ── 5. Bucket by interval ───────────────────────────────────────────
    let mut by_interval = Snapshot::new();
    for outcome in outcomes {
        if let TaskOutcome::Record(record) = outcome {
            by_interval
                .entry(record.interval.clone())
                .or_insert_with(Vec::new)
                .push(record);
        }
    }

    for interval in &state.settings.intervals {
        let count = by_interval.get(interval).map_or(0, Vec::len);
        store.set_interval_count(interval, count);
        store.log_line(&format!("Loaded {count} symbols for {interval} interval"));
    }

    // ── 6. Atomic publish (only when there is something to publish) ─────
    let record_total: usize = by_interval.values().map(Vec::len).sum();
    if record_total > 0 {
        store.replace(by_interval);
        store.log_line("Cache updated successfully!");
    }

    store.mark_refreshed();
    store.log_line(&format!(
        "Refresh complete: {} volatility records in {:.1}s",
        record_total,
        started.elapsed().as_secs_f64()
    ));
    store.finish_cycle();

    Ok(())
}
