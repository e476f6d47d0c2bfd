// src/error.rs
//! Failure taxonomy for a single upstream attempt.
//!
//! None of these reach HTTP clients: the aggregator logs them, counts them,
//! and moves on to the next source in the chain.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeout, DNS, connection refused, body read errors.
    #[error("network failure: {0}")]
    Network(String),

    /// Non-2xx status. 401/403 usually means the anti-bot wall kicked in.
    #[error("upstream rejected request with status {status}")]
    UpstreamRejection { status: u16 },

    /// Body did not have the expected shape (HTML where JSON was expected, bad XML, ...).
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Parsed fine but produced zero records.
    #[error("upstream returned no records")]
    EmptyResult,
}

impl FetchError {
    /// Short label used as a metrics dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::UpstreamRejection { .. } => "rejected",
            FetchError::MalformedResponse(_) => "malformed",
            FetchError::EmptyResult => "empty",
        }
    }

    /// 401/403: worth one credential refresh before giving up on the source.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            FetchError::UpstreamRejection {
                status: 401 | 403
            }
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::UpstreamRejection {
                status: status.as_u16(),
            };
        }
        if e.is_timeout() {
            return FetchError::Network(format!("timeout: {e}"));
        }
        FetchError::Network(e.to_string())
    }
}
