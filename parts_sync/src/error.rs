//! Error types for parts_sync

use parts_common::PricingError;
use std::fmt;

/// Unified error type for parts_sync operations
#[derive(Debug)]
pub enum SyncError {
    /// HTTP request failed (network error, timeout, etc.)
    Network(reqwest::Error),
    /// Failed to parse a JSON payload
    Parse(serde_json::Error),
    /// Upstream answered with a non-success status
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    /// TME answered 200 but its `Status` field was not `OK`
    Api { endpoint: String, status: String },
    /// GraphQL response carried an `errors` array
    GraphQl(String),
    /// Token endpoint rejected the credentials or returned garbage
    Auth(String),
    /// Database operation failed
    Database(rusqlite::Error),
    /// Price calculation rejected its inputs or the profile
    Pricing(PricingError),
    /// Caller supplied something unusable
    InvalidInput(String),
    /// Reading an identifier list or profile file failed
    Io(std::io::Error),
}

/// Short alias used across the crate
pub type Error = SyncError;

impl SyncError {
    /// Whether a retry has a reasonable chance of succeeding
    ///
    /// Connection problems, timeouts, 429 and 5xx are transient. Everything
    /// else (bad credentials, 4xx, malformed payloads) fails the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            SyncError::HttpStatus { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Network(e) => write!(f, "Network error: {}", e),
            SyncError::Parse(e) => write!(f, "Parse error: {}", e),
            SyncError::HttpStatus { status, body } => {
                if body.is_empty() {
                    write!(f, "HTTP error: {}", status)
                } else {
                    write!(f, "HTTP error: {} - {}", status, body)
                }
            }
            SyncError::Api { endpoint, status } => write!(f, "TME API error on {}: {}", endpoint, status),
            SyncError::GraphQl(errors) => write!(f, "GraphQL error: {}", errors),
            SyncError::Auth(msg) => write!(f, "Authentication failed: {}", msg),
            SyncError::Database(e) => write!(f, "Database error: {}", e),
            SyncError::Pricing(e) => write!(f, "{}", e),
            SyncError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SyncError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Network(e) => Some(e),
            SyncError::Parse(e) => Some(e),
            SyncError::Database(e) => Some(e),
            SyncError::Pricing(e) => Some(e),
            SyncError::Io(e) => Some(e),
            SyncError::HttpStatus { .. }
            | SyncError::Api { .. }
            | SyncError::GraphQl(_)
            | SyncError::Auth(_)
            | SyncError::InvalidInput(_) => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database(err)
    }
}

impl From<PricingError> for SyncError {
    fn from(err: PricingError) -> Self {
        SyncError::Pricing(err)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err)
    }
}

/// Result alias for parts_sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
