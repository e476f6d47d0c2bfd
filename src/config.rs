// src/config.rs
//! Proxy configuration: source chains, TTLs, fallbacks, credential refresh.
//!
//! Lookup order:
//! 1) `$PROXY_CONFIG_PATH` (must exist when set)
//! 2) `config/proxy.toml`
//! 3) built-in `default_seed()`

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::{Aggregator, CategoryChain};
use crate::category::Category;
use crate::credential::{CredentialStore, DEFAULT_MIN_REFRESH_GAP};
use crate::mappers::MapperName;
use crate::records::Record;
use crate::source::{SourceDescriptor, SourceKind, COOKIE_PLACEHOLDER, DEFAULT_TIMEOUT};
use crate::transport::{HttpTransport, Transport, BROWSER_USER_AGENT};

pub const ENV_PROXY_CONFIG_PATH: &str = "PROXY_CONFIG_PATH";
pub const DEFAULT_PROXY_CONFIG_PATH: &str = "config/proxy.toml";
pub const ENV_DEBUG_ROUTES: &str = "DEBUG_ROUTES";

fn default_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}
fn default_connect_timeout_ms() -> u64 {
    4_000
}
fn default_refresh_interval_secs() -> u64 {
    15 * 60
}
fn default_credential_timeout_ms() -> u64 {
    6_000
}
fn default_min_refresh_gap_secs() -> u64 {
    DEFAULT_MIN_REFRESH_GAP.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub credential: Option<CredentialCfg>,
    /// Mount `/debug/cache`. `DEBUG_ROUTES=1` also enables it.
    #[serde(default)]
    pub debug_routes: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpCfg {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialCfg {
    pub landing_url: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_credential_timeout_ms")]
    pub timeout_ms: u64,
    /// Request-triggered refreshes (first use, 401/403) at most this often.
    #[serde(default = "default_min_refresh_gap_secs")]
    pub min_refresh_gap_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryCfg {
    /// Defaults to the category's built-in TTL.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub sources: Vec<SourceCfg>,
    /// Defaults to the category's built-in placeholder.
    #[serde(default)]
    pub fallback: Vec<Record>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCfg {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub mapper: MapperName,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Values may contain `{cookie}`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl SourceCfg {
    fn json(name: &str, url: &str, mapper: MapperName) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Json,
            url: url.into(),
            mapper,
            timeout_ms: Some(9_000),
            headers: BTreeMap::new(),
        }
    }

    fn with_header(mut self, k: &str, v: &str) -> Self {
        self.headers.insert(k.into(), v.into());
        self
    }

    /// NSE refuses API calls without the session cookie and a same-site referer.
    fn nse(name: &str, url: &str, mapper: MapperName) -> Self {
        Self::json(name, url, mapper)
            .with_header("Cookie", COOKIE_PLACEHOLDER)
            .with_header("Referer", "https://www.nseindia.com/")
            .with_header("Accept", "application/json, text/plain, */*")
    }

    fn to_descriptor(&self) -> SourceDescriptor {
        let mut d = SourceDescriptor::new(self.name.clone(), self.url.clone(), self.mapper.build())
            .with_timeout(
                self.timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_TIMEOUT),
            );
        for (k, v) in &self.headers {
            d = d.with_header(k.clone(), v.clone());
        }
        d
    }
}

impl ProxyConfig {
    /// Load and validate a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading proxy config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing proxy config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ProxyConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Env var, then `config/proxy.toml`, then the built-in seed.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PROXY_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PROXY_CONFIG_PATH} points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_PROXY_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default_seed())
    }

    pub fn validate(&self) -> Result<()> {
        for (key, cat_cfg) in &self.categories {
            let category: Category = key.parse()?;
            if cat_cfg.sources.is_empty() {
                bail!("category '{key}' has no sources");
            }
            if cat_cfg.ttl_secs == Some(0) {
                bail!("category '{key}' has ttl_secs = 0");
            }
            for s in &cat_cfg.sources {
                if !(s.url.starts_with("http://") || s.url.starts_with("https://")) {
                    bail!("source '{}' in '{key}' has a non-http url", s.name);
                }
                let mapper = s.mapper.build();
                if mapper.kind() != s.kind {
                    bail!(
                        "source '{}' in '{key}': mapper '{}' expects {:?}, source kind is {:?}",
                        s.name,
                        mapper.name(),
                        mapper.kind(),
                        s.kind
                    );
                }
                if s.mapper.shape() != category.shape() {
                    bail!(
                        "source '{}' in '{key}': mapper '{}' does not produce {key} records",
                        s.name,
                        mapper.name()
                    );
                }
            }
            if cat_cfg.fallback.iter().any(|r| r.shape() != category.shape()) {
                bail!("category '{key}' has fallback records of the wrong shape");
            }
        }
        if let Some(c) = &self.credential {
            if c.refresh_interval_secs == 0 {
                bail!("credential.refresh_interval_secs must be > 0");
            }
        }
        Ok(())
    }

    pub fn debug_routes_enabled(&self) -> bool {
        self.debug_routes || std::env::var(ENV_DEBUG_ROUTES).ok().as_deref() == Some("1")
    }

    /// Chains keyed by category, in config order.
    pub fn chains(&self) -> Result<Vec<(Category, CategoryChain)>> {
        self.categories
            .iter()
            .map(|(key, c)| {
                let category: Category = key.parse()?;
                let chain = CategoryChain::new(
                    c.sources.iter().map(SourceCfg::to_descriptor).collect(),
                    c.ttl_secs
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| category.default_ttl()),
                    if c.fallback.is_empty() {
                        category.default_fallback()
                    } else {
                        c.fallback.clone()
                    },
                );
                Ok((category, chain))
            })
            .collect()
    }

    pub fn credential_store(&self, transport: Arc<dyn Transport>) -> Option<Arc<CredentialStore>> {
        self.credential.as_ref().map(|c| {
            Arc::new(
                CredentialStore::new(
                    c.landing_url.clone(),
                    Duration::from_millis(c.timeout_ms),
                    transport,
                )
                .with_min_refresh_gap(Duration::from_secs(c.min_refresh_gap_secs)),
            )
        })
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.credential
            .as_ref()
            .map(|c| Duration::from_secs(c.refresh_interval_secs))
    }

    /// Aggregator wired to an arbitrary transport (tests pass a mock).
    pub fn build_aggregator_with(&self, transport: Arc<dyn Transport>) -> Result<Aggregator> {
        let cred = self.credential_store(transport.clone());
        let mut agg = Aggregator::new(transport, cred);
        for (category, chain) in self.chains()? {
            agg = agg.with_chain(category, chain);
        }
        Ok(agg)
    }

    /// Aggregator wired to the real HTTP transport.
    pub fn build_aggregator(&self) -> Result<Aggregator> {
        let transport = HttpTransport::new(
            &self.http.user_agent,
            Duration::from_millis(self.http.connect_timeout_ms),
        )?;
        self.build_aggregator_with(Arc::new(transport))
    }

    /// Built-in chains for NSE data.
    pub fn default_seed() -> Self {
        use MapperName::*;
        let mut categories = BTreeMap::new();

        categories.insert(
            "gainers".to_string(),
            CategoryCfg {
                ttl_secs: Some(45),
                sources: vec![
                    SourceCfg::nse(
                        "nse-variations",
                        "https://www.nseindia.com/api/live-analysis-variations?index=gainers",
                        Movers,
                    ),
                    SourceCfg::nse(
                        "nse-equity-gainers",
                        "https://www.nseindia.com/api/live-analysis-equity-gainers",
                        Movers,
                    ),
                    SourceCfg::nse(
                        "nse-live-analysis",
                        "https://www.nseindia.com/api/live-analysis?type=gainers",
                        Movers,
                    ),
                    SourceCfg::json(
                        "stockbhoomi",
                        "https://api.stockbhoomi.com/api/v1/gainers",
                        Movers,
                    ),
                ],
                fallback: Vec::new(),
            },
        );

        categories.insert(
            "losers".to_string(),
            CategoryCfg {
                ttl_secs: Some(45),
                sources: vec![
                    // NSE spells it "loosers"; keep both spellings in the chain
                    SourceCfg::nse(
                        "nse-variations",
                        "https://www.nseindia.com/api/live-analysis-variations?index=loosers",
                        Movers,
                    ),
                    SourceCfg::nse(
                        "nse-variations-alt",
                        "https://www.nseindia.com/api/live-analysis-variations?index=losers",
                        Movers,
                    ),
                    SourceCfg::nse(
                        "nse-equity-losers",
                        "https://www.nseindia.com/api/live-analysis-equity-losers",
                        Movers,
                    ),
                    SourceCfg::json(
                        "stockbhoomi",
                        "https://api.stockbhoomi.com/api/v1/losers",
                        Movers,
                    ),
                ],
                fallback: Vec::new(),
            },
        );

        categories.insert(
            "ipos".to_string(),
            CategoryCfg {
                ttl_secs: Some(300),
                sources: vec![
                    SourceCfg::nse(
                        "nse-ipo-current",
                        "https://www.nseindia.com/api/ipo-current-issues",
                        Ipos,
                    ),
                    SourceCfg::json("stockbhoomi", "https://api.stockbhoomi.com/api/v1/ipo", Ipos),
                ],
                fallback: Vec::new(),
            },
        );

        categories.insert(
            "news".to_string(),
            CategoryCfg {
                ttl_secs: Some(180),
                sources: vec![SourceCfg {
                    name: "economictimes-rss".into(),
                    kind: SourceKind::Rss,
                    url: "https://economictimes.indiatimes.com/markets/rssfeeds/1977021501.cms"
                        .into(),
                    mapper: News,
                    timeout_ms: Some(8_000),
                    headers: BTreeMap::new(),
                }],
                fallback: Vec::new(),
            },
        );

        Self {
            http: HttpCfg::default(),
            credential: Some(CredentialCfg {
                landing_url: "https://www.nseindia.com".into(),
                refresh_interval_secs: default_refresh_interval_secs(),
                timeout_ms: default_credential_timeout_ms(),
                min_refresh_gap_secs: default_min_refresh_gap_secs(),
            }),
            debug_routes: false,
            categories,
        }
    }
}
