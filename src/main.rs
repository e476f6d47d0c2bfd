//! NSE feed proxy: binary entrypoint.
//! Boots the Axum HTTP server, wiring routes, shared state, the credential
//! refresh task and Prometheus metrics.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nse_feed_proxy::credential::spawn_refresh_task;
use nse_feed_proxy::metrics::Metrics;
use nse_feed_proxy::{create_router, AppState, ProxyConfig};

/// Compact logs by default, JSON lines when `LOG_FORMAT=json`.
/// `try_init` because the deployment runtime may have installed a subscriber already.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nse_feed_proxy=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ProxyConfig::load_default().unwrap_or_else(|e| {
        warn!(error = ?e, "invalid proxy config, using built-in defaults");
        ProxyConfig::default_seed()
    });

    let state = match AppState::from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = ?e, "could not build state from config, using built-in defaults");
            AppState::from_config(&ProxyConfig::default_seed())?
        }
    };

    if let (Some(store), Some(every)) = (
        state.aggregator.credential().map(Arc::clone),
        cfg.refresh_interval(),
    ) {
        spawn_refresh_task(store, every);
        info!(interval_secs = every.as_secs(), "credential refresh task started");
    }

    let mut router = create_router(state);
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = ?e, "metrics disabled"),
    }

    Ok(router.into())
}
