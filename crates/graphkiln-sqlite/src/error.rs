//! Error types for SQLite storage

use graphkiln_core::StoreError;
use thiserror::Error;

/// SQLite storage error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// The database was written by an incompatible version
    #[error("Schema version mismatch: database has {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    /// The filter cannot be translated to SQL
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The connection was closed
    #[error("Connection closed")]
    Closed,

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl From<serde_json::Error> for SqliteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<SqliteError> for StoreError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Connection(msg) => Self::Io(msg),
            SqliteError::Schema(msg) => Self::Backend(msg),
            SqliteError::SchemaVersion { found, expected } => Self::SchemaMismatch { found, expected },
            SqliteError::UnsupportedFilter(msg) => Self::Unsupported(msg),
            SqliteError::Serialization(msg) => Self::Serialization(msg),
            SqliteError::Closed => Self::Closed,
            SqliteError::Rusqlite(e) => Self::Backend(e.to_string()),
        }
    }
}
