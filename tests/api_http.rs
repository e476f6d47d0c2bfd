// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot, with the
// upstreams replaced by a MockTransport.
//
// Covered:
// - GET /  and /health
// - GET /gainers  (X-Cache MISS -> HIT, X-Data-Source)
// - GET /ipos /losers /news  (placeholder data when nothing answers)
// - GET /picks
// - GET /debug/cache  (gated)
// - a resolve task that panics is answered with the placeholder

use std::sync::Arc;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use nse_feed_proxy::aggregator::{Aggregator, CategoryChain};
use nse_feed_proxy::api::{self, AppState, HEADER_CACHE, HEADER_DATA_SOURCE};
use nse_feed_proxy::category::Category;
use nse_feed_proxy::error::FetchError;
use nse_feed_proxy::extract::RawPayload;
use nse_feed_proxy::mappers::MoversJson;
use nse_feed_proxy::records::Record;
use nse_feed_proxy::source::{ResponseMapper, SourceDescriptor, SourceKind};
use nse_feed_proxy::transport::{MockReply, MockTransport};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

const GAINERS: &str = "https://nse.test/gainers";
const LOSERS: &str = "https://nse.test/losers";

fn chain(name: &str, url: &str, category: Category) -> CategoryChain {
    CategoryChain::new(
        vec![SourceDescriptor::new(name, url, Arc::new(MoversJson))],
        category.default_ttl(),
        category.default_fallback(),
    )
}

/// Router over live gainers/losers; ipos and news are left unconfigured.
fn test_router(debug_routes: bool) -> (Router, Arc<MockTransport>) {
    let t = Arc::new(
        MockTransport::new()
            .on(
                GAINERS,
                MockReply::json(r#"[{"symbol":"TATAMOTORS","perChange":4.85,"ltp":1024.5},{"symbol":"M&M","perChange":3.6}]"#),
            )
            .on(LOSERS, MockReply::json(r#"{"data":[{"symbol":"WIPRO","pChange":-2.9}]}"#)),
    );
    let agg = Aggregator::new(t.clone(), None)
        .with_chain(Category::Gainers, chain("nse", GAINERS, Category::Gainers))
        .with_chain(Category::Losers, chain("nse", LOSERS, Category::Losers));
    let state = AppState::new(Arc::new(agg)).with_debug_routes(debug_routes);
    (api::router(state), t)
}

async fn get(app: &Router, uri: &str) -> Response {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    app.clone().oneshot(req).await.expect("oneshot")
}

async fn json_body(resp: Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

fn header<'a>(resp: &'a Response, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn root_reports_running_with_timestamp() {
    let (app, _) = test_router(false);
    let resp = get(&app, "/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["status"], "NSE Proxy Running");
    let ts = v["time"].as_str().expect("time string");
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "bad time {ts}");
}

#[tokio::test]
async fn health_returns_200_and_ok_body() {
    let (app, _) = test_router(false);
    let resp = get(&app, "/health").await;
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(std::str::from_utf8(&bytes).unwrap().trim(), "ok");
}

#[tokio::test]
async fn gainers_miss_then_hit_with_diagnostic_headers() {
    let (app, t) = test_router(false);

    let r1 = get(&app, "/gainers").await;
    assert_eq!(r1.status(), StatusCode::OK);
    assert_eq!(header(&r1, HEADER_CACHE), "MISS");
    assert_eq!(header(&r1, HEADER_DATA_SOURCE), "nse");
    let v1 = json_body(r1).await;

    let r2 = get(&app, "/gainers").await;
    assert_eq!(header(&r2, HEADER_CACHE), "HIT");
    let v2 = json_body(r2).await;

    assert_eq!(v1, v2, "HIT must serve the identical payload");
    assert_eq!(t.hits(GAINERS), 1);

    // contract: plain array of {symbol, change[, lastPrice]}
    assert_eq!(v1[0]["symbol"], "TATAMOTORS");
    assert_eq!(v1[0]["change"], 4.85);
    assert_eq!(v1[0]["lastPrice"], 1024.5);
    assert!(v1[1].get("lastPrice").is_none());
}

#[tokio::test]
async fn unconfigured_categories_serve_placeholders() {
    let (app, _) = test_router(false);

    let ipos = get(&app, "/ipos").await;
    assert_eq!(ipos.status(), StatusCode::OK);
    assert_eq!(header(&ipos, HEADER_DATA_SOURCE), "fallback");
    let v = json_body(ipos).await;
    assert_eq!(v[0]["name"], "Fallback IPO");
    assert_eq!(v[0]["price"], "₹100-₹120");

    let news = json_body(get(&app, "/news").await).await;
    assert_eq!(news[0]["title"], "No live news");
    assert!(news[0]["pubDate"].is_string());
}

#[tokio::test]
async fn picks_follow_top_gainer_and_loser() {
    let (app, _) = test_router(false);
    let resp = get(&app, "/picks").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(
        v,
        serde_json::json!([
            {"type": "Long", "stock": "TATAMOTORS", "reason": "Top gainer stock"},
            {"type": "Short", "stock": "WIPRO", "reason": "Top loser stock"}
        ])
    );

    // picks went through the cache, so the category routes now HIT
    let losers = get(&app, "/losers").await;
    assert_eq!(header(&losers, HEADER_CACHE), "HIT");
}

#[tokio::test]
async fn picks_collapse_to_placeholder_when_losers_are_down() {
    let t = Arc::new(MockTransport::new().on(GAINERS, MockReply::json(r#"[{"symbol":"TCS","perChange":1.0}]"#)));
    let agg = Aggregator::new(t, None)
        .with_chain(Category::Gainers, chain("nse", GAINERS, Category::Gainers))
        .with_chain(Category::Losers, chain("nse", LOSERS, Category::Losers));
    let app = api::router(AppState::new(Arc::new(agg)));

    let v = json_body(get(&app, "/picks").await).await;
    assert_eq!(
        v,
        serde_json::json!([{"type": "Long", "stock": "Fallback Pick", "reason": "No live data"}])
    );
}

#[tokio::test]
async fn debug_cache_is_hidden_unless_enabled() {
    let (app, _) = test_router(false);
    assert_eq!(get(&app, "/debug/cache").await.status(), StatusCode::NOT_FOUND);

    let (app, _) = test_router(true);
    let _ = get(&app, "/gainers").await;
    let resp = get(&app, "/debug/cache").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    let rows = v.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["category"], "gainers");
    assert_eq!(rows[0]["source"], "nse");
    assert_eq!(rows[0]["fresh"], true);
    assert_eq!(rows[0]["ttl_secs"], 45);
}

#[tokio::test]
async fn cors_allows_browser_callers() {
    let (app, _) = test_router(false);
    let req = Request::builder()
        .method("GET")
        .uri("/gainers")
        .header("origin", "https://dashboard.example")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(
        header(&resp, "access-control-allow-origin"),
        "https://dashboard.example"
    );
}

/// Mapper that blows up mid-resolution.
struct Exploding;

impl ResponseMapper for Exploding {
    fn map(&self, _raw: &RawPayload) -> Result<Vec<Record>, FetchError> {
        panic!("mapper bug");
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Json
    }

    fn name(&self) -> &'static str {
        "exploding"
    }
}

#[tokio::test]
async fn panicking_resolution_serves_placeholder_once() {
    let t = Arc::new(MockTransport::new().on(GAINERS, MockReply::json(r#"[{"symbol":"TCS","perChange":1.0}]"#)));
    let chain = CategoryChain::new(
        vec![SourceDescriptor::new("boom", GAINERS, Arc::new(Exploding))],
        Category::Gainers.default_ttl(),
        Category::Gainers.default_fallback(),
    );
    let agg = Aggregator::new(t.clone(), None).with_chain(Category::Gainers, chain);
    let app = api::router(AppState::new(Arc::new(agg)));

    let resp = get(&app, "/gainers").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, HEADER_DATA_SOURCE), "fallback");
    assert_eq!(header(&resp, HEADER_CACHE), "MISS");
    let v = json_body(resp).await;
    assert_eq!(v[0]["symbol"], "Fallback Gainer");
    // the failed pass is not run a second time inline
    assert_eq!(t.hits(GAINERS), 1);
}
