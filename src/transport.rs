// src/transport.rs
//! HTTP seam between the aggregator and the outside world.
//!
//! Production uses `HttpTransport` (reqwest). Tests plug in `MockTransport`,
//! which serves canned replies per URL and counts calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, SET_COOKIE};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::FetchError;

/// Browser-like identity; several upstreams refuse obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// Raw `Set-Cookie` header values, in response order.
    pub set_cookies: Vec<String>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body on 2xx, `UpstreamRejection` otherwise.
    pub fn into_body(self) -> Result<String, FetchError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(FetchError::UpstreamRejection {
                status: self.status,
            })
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static("*/*"));
        defaults.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(defaults)
            .connect_timeout(connect_timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut rb = self.client.get(&req.url).timeout(req.timeout);
        for (k, v) in &req.headers {
            rb = rb.header(k.as_str(), v.as_str());
        }

        let resp = rb.send().await?;
        let status = resp.status().as_u16();
        let set_cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = resp.text().await?;

        Ok(FetchResponse {
            status,
            body,
            set_cookies,
        })
    }
}

// --- Test helper ---

/// Canned reply for `MockTransport`.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(FetchResponse),
    Err(FetchError),
    /// Never completes; exercises the aggregator's timeout.
    Hang,
}

impl MockReply {
    pub fn json(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        MockReply::Ok(FetchResponse {
            status,
            body: body.to_string(),
            set_cookies: Vec::new(),
        })
    }

    pub fn with_cookies(cookies: &[&str]) -> Self {
        MockReply::Ok(FetchResponse {
            status: 200,
            body: "<html></html>".to_string(),
            set_cookies: cookies.iter().map(|c| c.to_string()).collect(),
        })
    }
}

/// Replies are consumed in order per URL; the last one sticks.
/// Unknown URLs get a network error.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: &str, reply: MockReply) -> Self {
        self.push(url, reply);
        self
    }

    pub fn push(&self, url: &str, reply: MockReply) {
        self.replies
            .lock()
            .expect("mock replies poisoned")
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Number of requests issued to `url`.
    pub fn hits(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("mock calls poisoned")
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn total_hits(&self) -> usize {
        self.calls.lock().expect("mock calls poisoned").len()
    }

    /// Requests issued to `url`, oldest first.
    pub fn requests(&self, url: &str) -> Vec<FetchRequest> {
        self.calls
            .lock()
            .expect("mock calls poisoned")
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<MockReply> {
        let mut g = self.replies.lock().expect("mock replies poisoned");
        let q = g.get_mut(url)?;
        if q.len() > 1 {
            q.pop_front()
        } else {
            q.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls
            .lock()
            .expect("mock calls poisoned")
            .push(req.clone());
        match self.next_reply(&req.url) {
            Some(MockReply::Ok(r)) => Ok(r),
            Some(MockReply::Err(e)) => Err(e),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(FetchError::Network(format!("no route to {}", req.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_consumes_replies_and_last_one_sticks() {
        let m = MockTransport::new()
            .on("u", MockReply::status(500, ""))
            .on("u", MockReply::json("[]"));
        let req = FetchRequest::get("u", Duration::from_secs(1));
        assert_eq!(m.get(&req).await.unwrap().status, 500);
        assert_eq!(m.get(&req).await.unwrap().status, 200);
        assert_eq!(m.get(&req).await.unwrap().status, 200);
        assert_eq!(m.hits("u"), 3);
        assert!(m.get(&FetchRequest::get("other", Duration::from_secs(1))).await.is_err());
    }

    #[test]
    fn non_2xx_body_is_rejection() {
        let r = FetchResponse {
            status: 403,
            ..Default::default()
        };
        assert_eq!(
            r.into_body(),
            Err(FetchError::UpstreamRejection { status: 403 })
        );
    }
}
