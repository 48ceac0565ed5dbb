// =============================================================================
// Scheduler — fixed-cadence refresh loop
// =============================================================================
//
// Runs refresh cycles forever: cycle, sleep `refresh_secs`, repeat. Cycles
// never overlap — the next one starts only after the previous fully
// completes. An error escaping `run_cycle` (it should capture its own
// failures) is logged into the cycle status and the loop keeps going.
//
// Shutdown is cooperative: the signal is observed during the inter-cycle
// sleep, so an in-flight cycle drains naturally before the loop exits.
// =============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::refresh;

/// Drive refresh cycles until `shutdown` fires. The first cycle starts
/// immediately so the API has data as soon as possible after boot.
pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    info!(
        refresh_secs = state.settings.refresh_secs,
        batch_size = state.settings.batch_size,
        "refresh loop starting"
    );

    loop {
        if let Err(e) = refresh::run_cycle(&state).await {
            error!(error = %e, "refresh cycle failed unexpectedly");
            state.store.record_error(format!("cycle failed: {e:#}"));
            state.store.finish_cycle();
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(state.settings.refresh_secs)) => {}
            _ = shutdown.changed() => {
                info!("shutdown signal received — refresh loop stopping");
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::binance::RequestStats;
    use crate::config::Settings;
    use crate::source::{Candle, CandleSource};

    /// A source whose universe fetch always fails; the loop must survive it.
    struct AlwaysFailing;

    #[async_trait]
    impl CandleSource for AlwaysFailing {
        async fn list_active_symbols(&self) -> Result<Vec<String>> {
            Err(anyhow!("upstream unreachable"))
        }

        async fn fetch_candles(&self, _: &str, _: &str, _: u32) -> Result<Vec<Candle>> {
            Err(anyhow!("upstream unreachable"))
        }
    }

    #[tokio::test]
    async fn loop_survives_failing_cycles_and_stops_on_shutdown() {
        let settings = Settings {
            refresh_secs: 3600, // park in the sleep after the first cycle
            ..Settings::default()
        };
        let state = Arc::new(AppState::new(
            settings,
            Arc::new(AlwaysFailing),
            Arc::new(RequestStats::new()),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(state.clone(), rx));

        // Give the first (failing) cycle a moment to complete.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let status = state.store.status();
        assert!(!status.errors.is_empty());
        assert!(!status.in_progress);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("loop must stop promptly on shutdown")
            .unwrap();
    }
}
