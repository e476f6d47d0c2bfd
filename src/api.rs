// src/api.rs
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;

use crate::aggregator::{Aggregator, Resolution};
use crate::category::Category;
use crate::config::ProxyConfig;
use crate::picks::{self, Pick};
use crate::records::{Record, Resolved};

pub const HEADER_CACHE: &str = "x-cache";
pub const HEADER_DATA_SOURCE: &str = "x-data-source";

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub debug_routes: bool,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            debug_routes: false,
        }
    }

    pub fn with_debug_routes(mut self, on: bool) -> Self {
        self.debug_routes = on;
        self
    }

    /// State backed by the real HTTP transport.
    pub fn from_config(cfg: &ProxyConfig) -> anyhow::Result<Self> {
        let agg = cfg.build_aggregator()?;
        Ok(Self::new(Arc::new(agg)).with_debug_routes(cfg.debug_routes_enabled()))
    }
}

pub fn create_router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .route("/ipos", get(ipos))
        .route("/gainers", get(gainers))
        .route("/losers", get(losers))
        .route("/news", get(news))
        .route("/picks", get(picks_handler));

    if state.debug_routes {
        r = r.route("/debug/cache", get(debug_cache));
    }

    r.layer(CorsLayer::very_permissive()).with_state(state)
}

/// Alias kept for callers that prefer `api::router`.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

#[derive(Serialize)]
struct RootResp {
    status: &'static str,
    time: String,
}

async fn root() -> Json<RootResp> {
    Json(RootResp {
        status: "NSE Proxy Running",
        time: chrono::Utc::now().to_rfc3339(),
    })
}

fn diagnostics_headers(res: &Resolution) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        HEADER_CACHE,
        HeaderValue::from_static(if res.cache_hit { "HIT" } else { "MISS" }),
    );
    let src = HeaderValue::from_str(res.payload.source_label())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    h.insert(HEADER_DATA_SOURCE, src);
    h
}

/// Run the resolution on its own task so a client hanging up mid-request
/// does not abort a chain pass that other callers are waiting on. A task
/// that panics is answered with the category placeholder, never re-run.
async fn resolve_detached(agg: &Arc<Aggregator>, category: Category) -> Resolution {
    let task = {
        let agg = agg.clone();
        tokio::spawn(async move { agg.resolve_traced(category).await })
    };
    match task.await {
        Ok(res) => res,
        Err(e) => {
            tracing::error!(target: "api", %category, error = %e, "resolve task failed, serving fallback");
            Resolution {
                payload: Arc::new(Resolved::fallback(category.default_fallback())),
                cache_hit: false,
            }
        }
    }
}

async fn serve(state: &AppState, category: Category) -> (HeaderMap, Json<Vec<Record>>) {
    let res = resolve_detached(&state.aggregator, category).await;
    tracing::debug!(
        target: "api",
        %category,
        cache_hit = res.cache_hit,
        source = res.payload.source_label(),
        "served"
    );
    (diagnostics_headers(&res), Json(res.payload.records.clone()))
}

async fn ipos(State(state): State<AppState>) -> (HeaderMap, Json<Vec<Record>>) {
    serve(&state, Category::Ipos).await
}

async fn gainers(State(state): State<AppState>) -> (HeaderMap, Json<Vec<Record>>) {
    serve(&state, Category::Gainers).await
}

async fn losers(State(state): State<AppState>) -> (HeaderMap, Json<Vec<Record>>) {
    serve(&state, Category::Losers).await
}

async fn news(State(state): State<AppState>) -> (HeaderMap, Json<Vec<Record>>) {
    serve(&state, Category::News).await
}

async fn picks_handler(State(state): State<AppState>) -> Json<Vec<Pick>> {
    let gainers = resolve_detached(&state.aggregator, Category::Gainers).await;
    let losers = resolve_detached(&state.aggregator, Category::Losers).await;
    Json(picks::derive(&gainers.payload, &losers.payload))
}

#[derive(Serialize)]
struct CacheInfo {
    category: Category,
    source: String,
    fallback: bool,
    records: usize,
    fetched_at: String,
    age_secs: u64,
    ttl_secs: u64,
    fresh: bool,
}

async fn debug_cache(State(state): State<AppState>) -> Json<Vec<CacheInfo>> {
    let now = Instant::now();
    let rows = state
        .aggregator
        .cache()
        .snapshot()
        .into_iter()
        .map(|e| CacheInfo {
            category: e.category,
            source: e.payload.source_label().to_string(),
            fallback: e.payload.is_fallback(),
            records: e.payload.records.len(),
            fetched_at: e.fetched_at_utc.to_rfc3339(),
            age_secs: e.age(now).as_secs(),
            ttl_secs: e.ttl.as_secs(),
            fresh: e.is_fresh(now),
        })
        .collect();
    Json(rows)
}
