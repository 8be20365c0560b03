//! Library sync error types.

use debridmirror_types::ServiceTag;
use thiserror::Error;

/// Result type for sync operations.
pub type MirrorResult<T> = Result<T, SyncError>;

/// Errors that can occur while mirroring a remote library.
///
/// `Clone` so that one de-duplicated sync can hand the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// 429, 5xx, timeouts and connection failures. Retried by the rate limiter.
    #[error("transient remote error{}: {message}", status_suffix(*status))]
    Transient { status: Option<u16>, message: String },

    /// Any other 4xx. Never retried.
    #[error("remote request rejected ({status}): {message}")]
    Permanent { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error("no adapter registered for {0}")]
    UnknownService(ServiceTag),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl SyncError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            SyncError::Transient {
                status: Some(status),
                message,
            }
        } else {
            SyncError::Permanent { status, message }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SyncError::Transient { status: Some(429), .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// HTTP status behind the error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Transient { status, .. } => *status,
            SyncError::Permanent { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return SyncError::Transient {
                status: None,
                message: e.to_string(),
            };
        }
        if e.is_decode() {
            return SyncError::Malformed(e.to_string());
        }
        match e.status() {
            Some(status) => SyncError::from_status(status.as_u16(), e.to_string()),
            None => SyncError::Transient {
                status: None,
                message: e.to_string(),
            },
        }
    }
}
