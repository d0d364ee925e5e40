//! Sync errors

use graphkiln_core::{ConfigurationError, PlanError, StoreError, TransitionError};
use graphkiln_sparql::SparqlError;
use thiserror::Error;

/// A failed update request, after retries where they apply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Timeouts, connection failures, 5xx, 408, 429 that outlasted every retry
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// Malformed request or a 4xx; never retried
    #[error("permanent failure{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Permanent { status: Option<u16>, message: String },
}

impl TransportError {
    /// Classify an endpoint error after `attempts` tries
    pub fn from_sparql(err: &SparqlError, attempts: u32) -> Self {
        if err.is_transient() {
            Self::Transient {
                attempts,
                message: err.to_string(),
            }
        } else {
            Self::Permanent {
                status: err.status(),
                message: err.to_string(),
            }
        }
    }

    /// Whether this is the permanent kind
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

/// Errors from syncing a document or setting up the engine
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("record store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("endpoint: {0}")]
    Endpoint(#[from] SparqlError),
}

impl SyncError {
    /// Short name for summaries and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Plan(_) => "plan",
            Self::Transport(TransportError::Transient { .. }) => "transient_transport",
            Self::Transport(TransportError::Permanent { .. }) => "permanent_transport",
            Self::Store(_) => "record_store",
            Self::Transition(_) => "transition",
            Self::Endpoint(_) => "endpoint",
        }
    }
}

/// Convenient Result type alias
pub type SyncResult<T> = Result<T, SyncError>;
