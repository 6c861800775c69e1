//! Error taxonomy.
//!
//! Failures are contained at the smallest scope that owns them: a
//! `PlatformError` belongs to one API call, an `AnalysisError` to one update,
//! and only a `StateError::Corrupt` (or invalid configuration) stops a run.

use std::path::PathBuf;
use std::time::Duration;

/// Errors returned by the hosting platform (GitHub) client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    /// Timeouts, connection failures, 5xx and rate limiting. Retried.
    #[error("transient failure calling {endpoint}: {message}")]
    Transient {
        endpoint: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// 401/403. Never retried.
    #[error("authentication failed for {endpoint} (HTTP {status})")]
    Auth { endpoint: String, status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Any other 4xx.
    #[error("{endpoint} rejected the request (HTTP {status}): {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

/// Errors from the analysis service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis service transient failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The update cannot be assessed; notification must be skipped.
    #[error("analysis unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the persisted state store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Classifies errors for the retry helper.
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Server-provided delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for PlatformError {
    fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl Retryable for AnalysisError {
    fn is_transient(&self) -> bool {
        matches!(self, AnalysisError::Transient { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AnalysisError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl AnalysisError {
    /// A retryable failure without a server-provided delay.
    pub fn transient(message: impl Into<String>) -> Self {
        AnalysisError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }
}

impl PlatformError {
    /// Classify an HTTP status code returned by `endpoint`.
    pub fn from_status(
        endpoint: &str,
        status: reqwest::StatusCode,
        retry_after: Option<Duration>,
        body: String,
    ) -> Self {
        let endpoint = endpoint.to_string();
        match status.as_u16() {
            401 | 403 if retry_after.is_none() => PlatformError::Auth {
                endpoint,
                status: status.as_u16(),
            },
            // GitHub signals secondary rate limits with 403 + retry-after.
            403 | 429 => PlatformError::Transient {
                endpoint,
                message: format!("rate limited (HTTP {})", status.as_u16()),
                retry_after,
            },
            404 => PlatformError::NotFound(endpoint),
            code if status.is_server_error() => PlatformError::Transient {
                endpoint,
                message: format!("HTTP {}: {}", code, body),
                retry_after,
            },
            code => PlatformError::Rejected {
                endpoint,
                status: code,
                message: body,
            },
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            PlatformError::Transient {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
                retry_after: None,
            }
        } else {
            PlatformError::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}
