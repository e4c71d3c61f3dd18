//! Error taxonomy for the acquisition engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while searching or downloading papers
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Invalid request parameters - never retried, surfaced immediately
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Network or transport failure (connect, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the remote endpoint
    #[error("HTTP status {status}")]
    Http {
        status: u16,
        /// Retry-After hint in seconds, when the server provided one
        retry_after: Option<u64>,
    },

    /// Malformed remote payload - retrying will not fix it
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem failure writing an artifact
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Operation cancelled before it was dequeued
    #[error("Cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Whether a retry is likely to succeed.
    ///
    /// Transient: connection failures, timeouts, 5xx, and 429 (rate limited).
    /// Everything else fails immediately without consuming retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Network(_) => true,
            HarvestError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The coarse classification recorded on download results and log events
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarvestError::Validation(_) => ErrorKind::Validation,
            HarvestError::Network(_) | HarvestError::Http { .. } => ErrorKind::Network,
            HarvestError::Parse(_) => ErrorKind::Parse,
            HarvestError::Filesystem(_) => ErrorKind::Filesystem,
            HarvestError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            HarvestError::Http {
                status: status.as_u16(),
                retry_after: None,
            }
        } else {
            HarvestError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Filesystem(err.to_string())
    }
}

/// Coarse error classification, serialized into batch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Network,
    Parse,
    Filesystem,
    /// An extension hook raised; logged, never propagated
    Hook,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Parse => "parse",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Hook => "hook",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}
