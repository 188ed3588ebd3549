//! Error types for the aggregation and signal pipeline

use std::time::Duration;
use thiserror::Error;

/// Failure of one Exchange Source for one cycle. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    /// Ordering used to pick the most informative error when every pair failed
    pub(crate) fn severity(&self) -> u8 {
        match self {
            FetchError::RateLimited { .. } => 5,
            FetchError::Timeout(_) => 4,
            FetchError::Network(_) => 3,
            FetchError::Status(_) => 2,
            FetchError::Malformed(_) => 1,
            FetchError::Task(_) => 0,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

/// Invalid settings detected at startup. Fatal: the scheduler never starts.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid trading pair: {0:?}")]
    InvalidPair(String),

    #[error("Unknown exchange source: {0}")]
    UnknownSource(String),

    #[error("No enabled exchange source with at least one pair")]
    NoSources,

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Caller-side contract violations on the read API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown strategy kind: {0:?} (expected momentum, reversal or range)")]
    UnknownStrategy(String),
}
