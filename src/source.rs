// src/source.rs
//! Source descriptors: one upstream endpoint in a category's fallback chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::extract::RawPayload;
use crate::records::Record;

/// Placeholder replaced by the current session cookie at request time.
pub const COOKIE_PLACEHOLDER: &str = "{cookie}";

/// Default per-source timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(7_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Json,
    HtmlTable,
    Rss,
}

/// Turns an extracted payload into normalized records.
///
/// Returning `Ok(vec![])` is allowed; the aggregator treats it as
/// `FetchError::EmptyResult`.
pub trait ResponseMapper: Send + Sync {
    fn map(&self, raw: &RawPayload) -> Result<Vec<Record>, FetchError>;

    /// Kind of payload this mapper understands.
    fn kind(&self) -> SourceKind;

    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct SourceDescriptor {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub mapper: Arc<dyn ResponseMapper>,
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("mapper", &self.mapper.name())
            .finish()
    }
}

impl SourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        mapper: Arc<dyn ResponseMapper>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: mapper.kind(),
            url: url.into(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            mapper,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A source needs the session cookie when any header references it.
    pub fn requires_cookie(&self) -> bool {
        self.headers
            .iter()
            .any(|(_, v)| v.contains(COOKIE_PLACEHOLDER))
    }

    /// Headers with the cookie placeholder substituted. A header whose value
    /// becomes empty is dropped instead of being sent blank.
    pub fn resolved_headers(&self, cookie: Option<&str>) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(k, v)| {
                if !v.contains(COOKIE_PLACEHOLDER) {
                    return Some((k.clone(), v.clone()));
                }
                let c = cookie.unwrap_or_default();
                let out = v.replace(COOKIE_PLACEHOLDER, c);
                if out.trim().is_empty() {
                    None
                } else {
                    Some((k.clone(), out))
                }
            })
            .collect()
    }
}
