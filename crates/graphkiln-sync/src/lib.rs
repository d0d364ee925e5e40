//! # Graphkiln Sync
//!
//! Runs document snapshots through the planner and pushes the resulting
//! deltas to the triple store:
//!
//! - [`records`]: sync records and entity reference edges on any metadata backend
//! - [`claims`]: entity references of the documents in the current run
//! - [`lease`]: one in-flight sync per document
//! - [`batch`], [`retry`], [`executor`]: whole-document batches, backoff, atomic or two-phase upserts
//! - [`engine`]: the worker pool, cancellation and corpus reconciliation
//!
//! ```ignore
//! let engine = SyncEngine::from_config(&config, default_registry()?).await?;
//! let summary = engine.run(snapshots, &CancellationToken::new()).await?;
//! ```

pub mod batch;
pub mod claims;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lease;
pub mod records;
pub mod retry;
pub mod summary;

pub use batch::{pack, Batch};
pub use claims::{RunClaims, RunReferences};
pub use engine::{GraphReport, SyncEngine};
pub use error::{SyncError, SyncResult, TransportError};
pub use executor::{Executed, UpsertExecutor, UpsertJournal};
pub use lease::{DocumentLeases, Lease};
pub use records::{classify, EntityRef, SyncRecordStore, ENTITY_REF_KEYSPACE, SYNC_RECORD_KEYSPACE};
pub use retry::RetryConfig;
pub use summary::{FailedDocument, SyncSummary};

pub use tokio_util::sync::CancellationToken;

use graphkiln_core::{BackendRegistry, ConfigurationError, MemoryBackendFactory};
use graphkiln_sparql::SparqlBackendFactory;
use graphkiln_sqlite::SqliteBackendFactory;

/// Registry with every backend this workspace ships: `memory`, `sqlite`, `sparql`
pub fn default_registry() -> Result<BackendRegistry, ConfigurationError> {
    Ok(BackendRegistry::builder()
        .register(MemoryBackendFactory)?
        .register(SqliteBackendFactory)?
        .register(SparqlBackendFactory)?
        .build())
}
