// =============================================================================
// Volscan — Crypto Volatility Scanner, Main Entry Point
// =============================================================================
//
// Polls Binance for every actively-traded pair against the configured quote
// asset, computes rolling volatility metrics per interval, and serves the
// latest snapshot over a read-only HTTP API.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod config;
mod metrics;
mod refresh;
mod scheduler;
mod source;
mod store;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::{BinanceClient, RequestStats};
use crate::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Volscan — crypto volatility scanner starting up");

    let mut settings = Settings::load("volscan.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load settings, using defaults");
        Settings::default()
    });
    settings.apply_env_overrides();

    info!(
        quote_asset = %settings.quote_asset,
        intervals = ?settings.intervals,
        windows = ?settings.ma_windows,
        refresh_secs = settings.refresh_secs,
        "scanner configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let request_stats = Arc::new(RequestStats::new());
    let client = Arc::new(BinanceClient::new(
        settings.base_url.clone(),
        settings.quote_asset.clone(),
        request_stats.clone(),
    ));
    let state = Arc::new(AppState::new(settings, client, request_stats));

    // ── 3. Start the refresh loop ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let refresh_handle = tokio::spawn(scheduler::run(state.clone(), shutdown_rx));

    // ── 4. Start the API server ──────────────────────────────────────────
    let bind_addr = state.settings.bind_addr.clone();
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind API server on {bind_addr}: {e}"))?;
    info!(addr = %bind_addr, "API server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "API server stopped");
        }
    });

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    let _ = shutdown_tx.send(true);
    let _ = refresh_handle.await;

    // Dropping the last AppState reference releases the upstream client's
    // connection pool.
    drop(state);

    info!("Volscan shut down complete.");
    Ok(())
}
