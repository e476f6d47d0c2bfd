// tests/config_file.rs
//
// Config files on disk drive the aggregator end to end (mock transport).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nse_feed_proxy::category::Category;
use nse_feed_proxy::config::ProxyConfig;
use nse_feed_proxy::source::SourceKind;
use nse_feed_proxy::transport::{MockReply, MockTransport};

const LANDING: &str = "https://www.nseindia.com";
const NSE_GAINERS: &str = "https://www.nseindia.com/api/live-analysis-variations?index=gainers";

#[test]
fn shipped_config_is_valid() {
    let cfg = ProxyConfig::load_from(Path::new("config/proxy.toml")).expect("config/proxy.toml");
    assert!(!cfg.debug_routes);
    assert_eq!(cfg.refresh_interval(), Some(Duration::from_secs(900)));

    let chains = cfg.chains().unwrap();
    assert_eq!(chains.len(), 4);
    for (category, chain) in &chains {
        assert_eq!(chain.ttl, category.default_ttl(), "{category}");
        assert!(!chain.fallback.is_empty());
    }
}

#[tokio::test]
async fn shipped_config_resolves_with_session_cookie() {
    let cfg = ProxyConfig::load_from(Path::new("config/proxy.toml")).unwrap();
    let t = Arc::new(
        MockTransport::new()
            .on(LANDING, MockReply::with_cookies(&["nsit=abc; Path=/", "nseappid=xyz; Path=/"]))
            .on(NSE_GAINERS, MockReply::json(r#"{"allSec":{"data":[{"symbol":"SBIN","perChange":2.4}]}}"#)),
    );
    let agg = cfg.build_aggregator_with(t.clone()).unwrap();

    let out = agg.resolve(Category::Gainers).await;
    assert_eq!(out.source_label(), "nse-variations");
    assert_eq!(t.hits(LANDING), 1);

    let reqs = t.requests(NSE_GAINERS);
    let req = &reqs[0];
    let header = |name: &str| {
        req.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(header("Cookie"), Some("nsit=abc; nseappid=xyz"));
    assert_eq!(header("Referer"), Some("https://www.nseindia.com/"));
}

#[test]
fn tempfile_config_with_table_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.toml");
    std::fs::write(
        &path,
        r#"
[categories.ipos]
ttl_secs = 120

[[categories.ipos.sources]]
name = "calendar"
kind = "html_table"
url = "https://ipo.example/calendar"
mapper = "ipos_table"
timeout_ms = 2500

[[categories.ipos.fallback]]
name = "No IPOs"
"#,
    )
    .unwrap();

    let cfg = ProxyConfig::load_from(&path).unwrap();
    assert!(cfg.credential.is_none());
    assert_eq!(cfg.refresh_interval(), None);

    let chains = cfg.chains().unwrap();
    let (category, chain) = &chains[0];
    assert_eq!(*category, Category::Ipos);
    assert_eq!(chain.ttl, Duration::from_secs(120));
    assert_eq!(chain.sources[0].kind, SourceKind::HtmlTable);
    assert_eq!(chain.sources[0].timeout, Duration::from_millis(2500));
    assert!(!chain.sources[0].requires_cookie());
    assert_eq!(
        serde_json::to_value(&chain.fallback).unwrap(),
        serde_json::json!([{"name": "No IPOs", "open": "", "close": "", "price": ""}])
    );
}

#[test]
fn broken_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[categories.gainers\n").unwrap();
    let err = ProxyConfig::load_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"), "{err:#}");
}

#[tokio::test]
async fn app_builds_from_shipped_config() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let app = nse_feed_proxy::app().await.expect("app()");
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[test]
fn aggregator_exposes_configured_chains() {
    let cfg = ProxyConfig::load_from(Path::new("config/proxy.toml")).unwrap();
    let agg = cfg
        .build_aggregator_with(Arc::new(MockTransport::new()))
        .unwrap();
    let news = agg.chain(Category::News).expect("news chain");
    assert_eq!(news.sources[0].kind, SourceKind::Rss);
    assert!(agg.credential().is_some());
}
