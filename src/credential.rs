// src/credential.rs
//! Session cookie for upstreams that refuse requests without one.
//!
//! The credential is refreshed by hitting the public landing page and keeping
//! whatever `Set-Cookie` headers come back. A failed refresh leaves the
//! previous value in place; requests with a stale cookie simply fail and the
//! chain moves on.
//!
//! Refreshes triggered by requests (first use, 401/403) are throttled to one
//! attempt per `min_refresh_gap`, so a landing page that keeps failing costs
//! at most one hit per window instead of one per source.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{FetchRequest, Transport, BROWSER_USER_AGENT};

/// Minimum spacing between request-triggered refresh attempts.
pub const DEFAULT_MIN_REFRESH_GAP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub value: String,
    pub refreshed_at: DateTime<Utc>,
}

pub struct CredentialStore {
    landing_url: String,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    current: RwLock<Option<Arc<SessionCredential>>>,
    // serializes refreshes so an auth-failure retry and the timer don't race
    refreshing: tokio::sync::Mutex<()>,
    min_gap: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl CredentialStore {
    pub fn new(landing_url: impl Into<String>, timeout: Duration, transport: Arc<dyn Transport>) -> Self {
        Self {
            landing_url: landing_url.into(),
            timeout,
            transport,
            current: RwLock::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            min_gap: DEFAULT_MIN_REFRESH_GAP,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn with_min_refresh_gap(mut self, gap: Duration) -> Self {
        self.min_gap = gap;
        self
    }

    /// Current credential, if any refresh has succeeded yet.
    pub fn current(&self) -> Option<Arc<SessionCredential>> {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn cookie(&self) -> Option<String> {
        self.current().map(|c| c.value.clone())
    }

    fn replace(&self, fresh: SessionCredential) {
        let fresh = Arc::new(fresh);
        match self.current.write() {
            Ok(mut g) => *g = Some(fresh),
            Err(poison) => *poison.into_inner() = Some(fresh),
        }
    }

    fn recently_attempted(&self) -> bool {
        let last = match self.last_attempt.lock() {
            Ok(g) => *g,
            Err(poison) => *poison.into_inner(),
        };
        last.is_some_and(|t| t.elapsed() < self.min_gap)
    }

    fn mark_attempt(&self) {
        let now = Instant::now();
        match self.last_attempt.lock() {
            Ok(mut g) => *g = Some(now),
            Err(poison) => *poison.into_inner() = Some(now),
        }
    }

    /// Re-fetch the landing page and replace the credential on success.
    /// Returns whether a new credential was stored. Not throttled; the
    /// periodic task and explicit callers use this.
    pub async fn refresh(&self) -> bool {
        let _guard = self.refreshing.lock().await;
        self.refresh_locked().await
    }

    /// Refresh only when nothing has been stored yet and no attempt was made
    /// within the refresh gap.
    pub async fn ensure(&self) {
        if self.current().is_some() {
            return;
        }
        let _guard = self.refreshing.lock().await;
        // a concurrent caller may have filled it, or just failed
        if self.current().is_some() || self.recently_attempted() {
            return;
        }
        self.refresh_locked().await;
    }

    /// Called after a request sent with `used` was rejected with 401/403.
    /// Returns whether retrying is worthwhile: another caller already
    /// replaced the credential, or a fresh one was just obtained.
    pub async fn refresh_after_rejection(&self, used: Option<&Arc<SessionCredential>>) -> bool {
        let _guard = self.refreshing.lock().await;
        let replaced = match (self.current(), used) {
            (Some(now), Some(old)) => !Arc::ptr_eq(&now, old),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if replaced {
            return true;
        }
        if self.recently_attempted() {
            debug!(target: "credential", "refresh attempted recently, not retrying");
            return false;
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> bool {
        self.mark_attempt();

        let mut req = FetchRequest::get(&self.landing_url, self.timeout);
        req.headers.push(("User-Agent".into(), BROWSER_USER_AGENT.into()));
        req.headers.push((
            "Accept".into(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
        ));

        let resp = match tokio::time::timeout(self.timeout, self.transport.get(&req)).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!(target: "credential", error = %e, url = %self.landing_url, "cookie refresh failed");
                counter!("proxy_credential_refresh_total", "outcome" => "error").increment(1);
                return false;
            }
            Err(_) => {
                warn!(target: "credential", url = %self.landing_url, "cookie refresh timed out");
                counter!("proxy_credential_refresh_total", "outcome" => "error").increment(1);
                return false;
            }
        };

        if !resp.is_success() {
            warn!(target: "credential", status = resp.status, "cookie refresh rejected");
            counter!("proxy_credential_refresh_total", "outcome" => "rejected").increment(1);
            return false;
        }

        let Some(value) = cookie_header_from(&resp.set_cookies) else {
            warn!(target: "credential", "landing page set no cookies");
            counter!("proxy_credential_refresh_total", "outcome" => "empty").increment(1);
            return false;
        };

        let count = resp.set_cookies.len();
        self.replace(SessionCredential {
            value,
            refreshed_at: Utc::now(),
        });
        counter!("proxy_credential_refresh_total", "outcome" => "ok").increment(1);
        info!(target: "credential", cookies = count, "session cookie refreshed");
        true
    }
}

/// Build a `Cookie` request header from `Set-Cookie` values:
/// keep each `name=value`, drop attributes, join with `"; "`.
pub fn cookie_header_from(set_cookies: &[String]) -> Option<String> {
    let pairs: Vec<&str> = set_cookies
        .iter()
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|p| p.contains('=') && !p.starts_with('='))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// Fixed-interval refresh. The first tick fires immediately, so the cookie is
/// warm before the first request in the common case.
pub fn spawn_refresh_task(store: Arc<CredentialStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            store.refresh().await;
        }
    })
}
