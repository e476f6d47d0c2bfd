// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod category;
pub mod config;
pub mod credential;
pub mod error;
pub mod extract;
pub mod mappers;
pub mod metrics;
pub mod picks;
pub mod records;
pub mod source;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::{Aggregator, CategoryChain, Resolution};
pub use crate::api::{create_router, router, AppState};
pub use crate::category::Category;
pub use crate::config::ProxyConfig;
pub use crate::error::FetchError;
pub use crate::records::{Record, Resolved};

use tracing::info;

/// Build the full router from the default config lookup, using the real HTTP
/// transport. Background credential refresh is not started here; the binary
/// owns that task.
pub async fn app() -> anyhow::Result<axum::Router> {
    let cfg = ProxyConfig::load_default()?;
    let state = AppState::from_config(&cfg)?;
    info!(
        categories = cfg.categories.len(),
        debug_routes = state.debug_routes,
        "proxy app built"
    );
    Ok(create_router(state))
}
