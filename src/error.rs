//! Huginn error types

use std::time::Duration;

/// Huginn error types
///
/// Every failure the client can surface is one variant here. The enum is
/// `Clone` so a single in-flight resource fetch can hand the same outcome to
/// every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HuginnError {
    // Connectivity
    #[error("offline: network is unavailable")]
    Offline,

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    // Server responses
    #[error("unauthorized: check the API token")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The circuit for `label` is open; no request was sent.
    #[error("circuit open for {label}, failing fast")]
    CircuitOpen { label: String },

    // Local outcomes
    #[error("request cancelled: queue cleared")]
    Cancelled,

    #[error("resource {resource_id} unresolvable: {reason}")]
    Unresolvable { resource_id: String, reason: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HuginnError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limiting, 5xx responses, connection failures and timeouts are
    /// transient. Everything else (auth, 4xx, offline, cancellation, open
    /// circuits, local failures) is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HuginnError::RateLimited { .. }
                | HuginnError::Server { .. }
                | HuginnError::Network(_)
                | HuginnError::Timeout
        )
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status associated with this error, when one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            HuginnError::Unauthorized => Some(401),
            HuginnError::Forbidden => Some(403),
            HuginnError::NotFound(_) => Some(404),
            HuginnError::RateLimited { .. } => Some(429),
            HuginnError::Server { status, .. } | HuginnError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HuginnError::Offline => "offline",
            HuginnError::Network(_) => "network",
            HuginnError::Timeout => "timeout",
            HuginnError::Unauthorized => "unauthorized",
            HuginnError::Forbidden => "forbidden",
            HuginnError::NotFound(_) => "not_found",
            HuginnError::RateLimited { .. } => "rate_limited",
            HuginnError::Server { .. } => "server",
            HuginnError::Api { .. } => "api",
            HuginnError::CircuitOpen { .. } => "circuit_open",
            HuginnError::Cancelled => "cancelled",
            HuginnError::Unresolvable { .. } => "unresolvable",
            HuginnError::Decode(_) => "decode",
            HuginnError::InvalidInput(_) => "invalid_input",
            HuginnError::Storage(_) => "storage",
            HuginnError::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HuginnError::Timeout
        } else if err.is_decode() {
            HuginnError::Decode(err.to_string())
        } else {
            HuginnError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HuginnError {
    fn from(err: serde_json::Error) -> Self {
        HuginnError::Decode(err.to_string())
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
