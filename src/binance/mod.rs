pub mod client;
pub mod stats;

// Re-export for convenient access (e.g. `use crate::binance::BinanceClient`).
pub use client::BinanceClient;
pub use stats::{RequestStats, RequestStatsSnapshot};
