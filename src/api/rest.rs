// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only projection over the snapshot store. The scan pipeline owns all
// writes; these handlers only sort, filter, and clamp. A request for data
// that is not ready yet gets an explicit "initializing" payload, never an
// error.
//
// CORS is configured permissively for the local dashboard.
// =============================================================================

use std::cmp::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::binance::RequestStatsSnapshot;
use crate::store::{CycleStatus, MetricRecord};

/// Hard cap on rows returned by the volatility endpoint.
const MAX_LIMIT: usize = 1000;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/volatility", get(volatility))
        .route("/api/status", get(status))
        .route("/api/debug/:interval", get(debug_interval))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Volatility rows
// =============================================================================

fn default_interval() -> String {
    "1h".to_string()
}

fn default_sort_by() -> String {
    "ma21".to_string()
}

fn default_descending() -> bool {
    true
}

fn default_limit() -> usize {
    100
}

#[derive(Deserialize)]
struct VolatilityQuery {
    #[serde(default = "default_interval")]
    interval: String,
    #[serde(default = "default_sort_by")]
    sort_by: String,
    #[serde(default = "default_descending")]
    descending: bool,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Serialize)]
struct VolatilityResponse {
    interval: String,
    rows: Vec<MetricRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

async fn volatility(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VolatilityQuery>,
) -> impl IntoResponse {
    let mut rows = state.store.get_interval(&query.interval);

    // Uninitialized store or unknown interval: an explicit empty payload.
    if rows.is_empty() {
        return Json(VolatilityResponse {
            interval: query.interval,
            rows: Vec::new(),
            status: Some("initializing"),
        });
    }

    sort_records(&mut rows, &query.sort_by, query.descending);
    rows.truncate(query.limit.min(MAX_LIMIT));

    Json(VolatilityResponse {
        interval: query.interval,
        rows,
        status: None,
    })
}

/// Sort key for one record: the metric value if present and usable for
/// numeric comparison, `None` otherwise.
fn sort_key(record: &MetricRecord, key: &str) -> Option<f64> {
    record.metrics.get(key).copied().filter(|v| v.is_finite())
}

/// Sort records by a metric. Records missing the metric (or carrying a
/// non-comparable value) always sort to the end, regardless of direction.
pub fn sort_records(rows: &mut [MetricRecord], key: &str, descending: bool) {
    rows.sort_by(|a, b| match (sort_key(a, key), sort_key(b, key)) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

// =============================================================================
// Status
// =============================================================================

#[derive(Serialize)]
struct StatusResponse<'a> {
    #[serde(flatten)]
    cycle: &'a CycleStatus,
    api_stats: RequestStatsSnapshot,
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cycle = state.store.status();
    Json(serde_json::to_value(StatusResponse {
        cycle: &cycle,
        api_stats: state.request_stats.snapshot(),
    })
    .unwrap_or_else(|_| serde_json::json!({"error": "status serialisation failed"})))
}

// =============================================================================
// Debug
// =============================================================================

#[derive(Serialize)]
struct DebugResponse {
    count: usize,
    sample: Vec<MetricRecord>,
}

async fn debug_interval(
    State(state): State<Arc<AppState>>,
    Path(interval): Path<String>,
) -> impl IntoResponse {
    let rows = state.store.get_interval(&interval);
    Json(DebugResponse {
        count: rows.len(),
        sample: rows.into_iter().take(5).collect(),
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(symbol: &str, ma21: Option<f64>) -> MetricRecord {
        let mut metrics = BTreeMap::new();
        if let Some(v) = ma21 {
            metrics.insert("ma21".to_string(), v);
        }
        MetricRecord {
            symbol: symbol.to_string(),
            interval: "1h".to_string(),
            metrics,
        }
    }

    fn symbols(rows: &[MetricRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.symbol.as_str()).collect()
    }

    #[test]
    fn descending_sort_puts_missing_last() {
        let mut rows = vec![
            record("NOMETRIC", None),
            record("LOW", Some(0.1)),
            record("HIGH", Some(0.9)),
        ];
        sort_records(&mut rows, "ma21", true);
        assert_eq!(symbols(&rows), vec!["HIGH", "LOW", "NOMETRIC"]);
    }

    #[test]
    fn ascending_sort_also_puts_missing_last() {
        let mut rows = vec![
            record("NOMETRIC", None),
            record("HIGH", Some(0.9)),
            record("LOW", Some(0.1)),
        ];
        sort_records(&mut rows, "ma21", false);
        assert_eq!(symbols(&rows), vec!["LOW", "HIGH", "NOMETRIC"]);
    }

    #[test]
    fn non_finite_values_sort_to_the_end() {
        let mut rows = vec![
            record("NAN", Some(f64::NAN)),
            record("OK", Some(0.5)),
        ];
        sort_records(&mut rows, "ma21", true);
        assert_eq!(symbols(&rows), vec!["OK", "NAN"]);
        sort_records(&mut rows, "ma21", false);
        assert_eq!(symbols(&rows), vec!["OK", "NAN"]);
    }

    #[test]
    fn sorting_by_unknown_metric_keeps_all_rows() {
        let mut rows = vec![record("A", Some(0.1)), record("B", Some(0.2))];
        sort_records(&mut rows, "ma999", true);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn volatility_query_defaults() {
        let q: VolatilityQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.interval, "1h");
        assert_eq!(q.sort_by, "ma21");
        assert!(q.descending);
        assert_eq!(q.limit, 100);
    }
}
