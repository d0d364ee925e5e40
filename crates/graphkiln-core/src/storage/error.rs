//! Metadata store error types

use thiserror::Error;

/// Errors raised by a [`MetadataStore`](super::MetadataStore) backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend cannot evaluate the requested operation or predicate
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The store was closed
    #[error("Store is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    /// On-disk or remote data was written by an incompatible schema
    #[error("Schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// Result type for metadata store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Create a generic backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an unsupported-operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_))
    }

    /// Short category name for logging and summaries
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported",
            Self::Closed => "closed",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Backend(_) => "backend",
            Self::SchemaMismatch { .. } => "schema",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
