//! SPARQL protocol errors

use graphkiln_core::StoreError;
use thiserror::Error;

/// Errors talking to a SPARQL endpoint
#[derive(Error, Debug)]
pub enum SparqlError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint could not be reached
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The endpoint answered with an error status
    #[error("Triple store error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Failed to parse a response body
    #[error("Failed to parse response: {reason}")]
    Parse { reason: String },

    /// The request could not be built
    #[error("Invalid SPARQL request: {reason}")]
    InvalidQuery { reason: String },
}

/// Convenient Result type alias
pub type SparqlResult<T> = Result<T, SparqlError>;

impl SparqlError {
    /// Parse error helper
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    /// Invalid request helper
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Whether a retry may succeed
    ///
    /// Timeouts, connection failures, 5xx, 408 and 429 are transient. Every
    /// other status, and anything wrong with the request itself, is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || (e.is_request() && !e.is_builder()),
            Self::Connection(_) => true,
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Parse { .. } | Self::InvalidQuery { .. } => false,
        }
    }

    /// HTTP status, if the endpoint answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// 5xx, 408 Request Timeout and 429 Too Many Requests
pub fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

impl From<SparqlError> for StoreError {
    fn from(err: SparqlError) -> Self {
        match err {
            SparqlError::Parse { reason } => Self::Serialization(reason),
            SparqlError::InvalidQuery { reason } => Self::Backend(reason),
            other if other.is_transient() => Self::Network(other.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}
