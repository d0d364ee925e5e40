//! Startup and planning errors

use crate::storage::StoreError;
use crate::triple::InvalidTriple;
use graphkiln_config::ConfigError;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Fatal configuration problems, raised before any sync attempt
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("unknown backend type '{type_key}', registered: {}", .available.join(", "))]
    UnknownBackend {
        type_key: String,
        available: Vec<String>,
    },

    #[error(
        "backend '{type_key}' does not support schema version {requested} (supported {}..={})",
        .supported.start(),
        .supported.end()
    )]
    UnsupportedSchemaVersion {
        type_key: String,
        requested: u32,
        supported: RangeInclusive<u32>,
    },

    #[error("invalid settings for backend '{type_key}': {reason}")]
    InvalidSettings { type_key: String, reason: String },

    #[error("backend type '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("failed to construct backend '{type_key}': {source}")]
    Construction {
        type_key: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors computing a sync plan for one document
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    InvalidTriple(#[from] InvalidTriple),

    /// The document's triples target a different graph than its last publish
    #[error("document {document_id} moved from graph <{recorded}> to <{requested}>")]
    GraphMismatch {
        document_id: String,
        recorded: String,
        requested: String,
    },

    /// Reference counting failed for a reason other than missing support
    #[error("reference count query failed: {0}")]
    Store(#[from] StoreError),
}

/// Result type for planning
pub type PlanResult<T> = Result<T, PlanError>;

impl PlanError {
    /// Whether retrying the document on a later run can help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::InvalidTriple(_) | Self::GraphMismatch { .. } => false,
        }
    }
}
