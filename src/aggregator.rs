// src/aggregator.rs
//! Resilient fetch aggregator.
//!
//! `resolve(category)` serves from cache while fresh; otherwise it walks the
//! category's source chain in priority order, keeps the first non-empty
//! result, falls back to static placeholder records when every source fails,
//! and caches whatever it ends up with for the category TTL.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CategoryCache};
use crate::category::Category;
use crate::credential::CredentialStore;
use crate::error::FetchError;
use crate::extract;
use crate::records::{Record, Resolved};
use crate::source::SourceDescriptor;
use crate::transport::{FetchRequest, Transport};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("proxy_cache_hits_total", "Resolutions served from cache.");
        describe_counter!(
            "proxy_cache_misses_total",
            "Resolutions that walked the source chain."
        );
        describe_counter!(
            "proxy_source_failures_total",
            "Upstream attempts that failed (by category, source, reason)."
        );
        describe_counter!(
            "proxy_fallback_total",
            "Resolutions that exhausted the chain and served placeholder data."
        );
        describe_counter!(
            "proxy_credential_refresh_total",
            "Session cookie refresh attempts by outcome."
        );
        describe_histogram!("proxy_resolve_ms", "Chain resolution time in milliseconds.");
    });
}

/// Ordered sources plus caching policy for one category.
#[derive(Debug, Clone)]
pub struct CategoryChain {
    pub sources: Vec<SourceDescriptor>,
    pub ttl: Duration,
    pub fallback: Vec<Record>,
}

impl CategoryChain {
    pub fn new(sources: Vec<SourceDescriptor>, ttl: Duration, fallback: Vec<Record>) -> Self {
        Self {
            sources,
            ttl,
            fallback,
        }
    }

    /// No sources; always serves the built-in placeholder.
    pub fn empty(category: Category) -> Self {
        Self::new(
            Vec::new(),
            category.default_ttl(),
            category.default_fallback(),
        )
    }
}

/// A resolved payload plus whether it came from cache.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub payload: Arc<Resolved>,
    pub cache_hit: bool,
}

pub struct Aggregator {
    chains: HashMap<Category, CategoryChain>,
    cache: CategoryCache,
    // one refresh guard per category: concurrent misses share a single pass
    guards: HashMap<Category, Mutex<()>>,
    transport: Arc<dyn Transport>,
    credential: Option<Arc<CredentialStore>>,
}

impl Aggregator {
    pub fn new(transport: Arc<dyn Transport>, credential: Option<Arc<CredentialStore>>) -> Self {
        Self {
            chains: HashMap::new(),
            cache: CategoryCache::new(),
            guards: Category::ALL.iter().map(|c| (*c, Mutex::new(()))).collect(),
            transport,
            credential,
        }
    }

    pub fn with_chain(mut self, category: Category, chain: CategoryChain) -> Self {
        self.chains.insert(category, chain);
        self
    }

    pub fn chain(&self, category: Category) -> Option<&CategoryChain> {
        self.chains.get(&category)
    }

    pub fn credential(&self) -> Option<&Arc<CredentialStore>> {
        self.credential.as_ref()
    }

    pub fn cache(&self) -> &CategoryCache {
        &self.cache
    }

    /// Resolve `category` to a non-empty record list.
    pub async fn resolve(&self, category: Category) -> Arc<Resolved> {
        self.resolve_traced(category).await.payload
    }

    /// Like `resolve`, also reporting whether the cache answered.
    pub async fn resolve_traced(&self, category: Category) -> Resolution {
        ensure_metrics_described();

        if let Some(hit) = self.cache_hit(category) {
            return hit;
        }

        let _guard = match self.guards.get(&category) {
            Some(m) => Some(m.lock().await),
            None => None,
        };
        // another caller may have refreshed while we waited
        if let Some(hit) = self.cache_hit(category) {
            return hit;
        }
        counter!("proxy_cache_misses_total", "category" => category.as_str()).increment(1);

        let owned;
        let chain = match self.chains.get(&category) {
            Some(c) => c,
            None => {
                owned = CategoryChain::empty(category);
                &owned
            }
        };

        let t0 = Instant::now();
        let resolved = Arc::new(self.run_chain(category, chain).await);
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("proxy_resolve_ms", "category" => category.as_str()).record(ms);

        self.cache.store(Arc::new(CacheEntry::new(
            category,
            resolved.clone(),
            chain.ttl,
        )));

        Resolution {
            payload: resolved,
            cache_hit: false,
        }
    }

    fn cache_hit(&self, category: Category) -> Option<Resolution> {
        let entry = self.cache.get_fresh(category, Instant::now())?;
        counter!("proxy_cache_hits_total", "category" => category.as_str()).increment(1);
        debug!(target: "aggregator", %category, "cache hit");
        Some(Resolution {
            payload: entry.payload.clone(),
            cache_hit: true,
        })
    }

    async fn run_chain(&self, category: Category, chain: &CategoryChain) -> Resolved {
        for desc in &chain.sources {
            match self.try_source(category, desc).await {
                Ok(records) => {
                    info!(
                        target: "aggregator",
                        %category,
                        source = %desc.name,
                        records = records.len(),
                        "resolved from source"
                    );
                    return Resolved::live(desc.name.clone(), records);
                }
                Err(e) => {
                    warn!(
                        target: "aggregator",
                        %category,
                        source = %desc.name,
                        error = %e,
                        "source failed, trying next"
                    );
                    counter!(
                        "proxy_source_failures_total",
                        "category" => category.as_str(),
                        "source" => desc.name.clone(),
                        "reason" => e.reason()
                    )
                    .increment(1);
                }
            }
        }

        warn!(target: "aggregator", %category, sources = chain.sources.len(), "all sources failed, serving fallback");
        counter!("proxy_fallback_total", "category" => category.as_str()).increment(1);
        let fallback = if chain.fallback.is_empty() {
            category.default_fallback()
        } else {
            chain.fallback.clone()
        };
        Resolved::fallback(fallback)
    }

    /// One source, with a single credential refresh + retry on 401/403.
    async fn try_source(
        &self,
        category: Category,
        desc: &SourceDescriptor,
    ) -> Result<Vec<Record>, FetchError> {
        let Some(cred) = self.credential.as_ref().filter(|_| desc.requires_cookie()) else {
            return self.fetch_once(category, desc, None).await;
        };
        cred.ensure().await;

        let used = cred.current();
        match self
            .fetch_once(category, desc, used.as_ref().map(|c| c.value.as_str()))
            .await
        {
            Err(e) if e.is_auth_failure() => {
                if !cred.refresh_after_rejection(used.as_ref()).await {
                    info!(target: "aggregator", %category, source = %desc.name, "auth failure, cookie refresh throttled; not retrying");
                    return Err(e);
                }
                info!(target: "aggregator", %category, source = %desc.name, "auth failure, retrying with refreshed cookie");
                let fresh = cred.cookie();
                self.fetch_once(category, desc, fresh.as_deref()).await
            }
            other => other,
        }
    }

    async fn fetch_once(
        &self,
        category: Category,
        desc: &SourceDescriptor,
        cookie: Option<&str>,
    ) -> Result<Vec<Record>, FetchError> {
        let req = FetchRequest {
            url: desc.url.clone(),
            headers: desc.resolved_headers(cookie),
            timeout: desc.timeout,
        };

        let resp = tokio::time::timeout(desc.timeout, self.transport.get(&req))
            .await
            .map_err(|_| FetchError::Network(format!("timed out after {:?}", desc.timeout)))??;
        let body = resp.into_body()?;
        let raw = extract::extract(desc.kind, &body)?;
        let records = desc.mapper.map(&raw)?;

        if records.is_empty() {
            return Err(FetchError::EmptyResult);
        }
        if records.iter().any(|r| r.shape() != category.shape()) {
            return Err(FetchError::MalformedResponse(format!(
                "mapper '{}' produced records of the wrong shape for {category}",
                desc.mapper.name()
            )));
        }
        Ok(records)
    }
}
