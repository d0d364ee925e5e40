//! # Graphkiln Core
//!
//! Data model and planning logic for synchronizing per-document triple sets
//! into a remote triple store.
//!
//! - [`triple`] and [`document`]: terms, triples, triple sets and snapshots
//! - [`vocabulary`]: namespaces and deterministic entity IRIs
//! - [`storage`]: the [`MetadataStore`] contract and the in-process backend
//! - [`registry`]: startup-time backend selection
//! - [`planner`]: minimal delete/insert deltas with shared-fact protection
//! - [`record`] and [`status`]: published state and the status state machine

pub mod document;
pub mod error;
pub mod planner;
pub mod record;
pub mod registry;
pub mod status;
pub mod storage;
pub mod triple;
pub mod vocabulary;

pub use document::{DocumentId, DocumentSnapshot};
pub use error::{ConfigurationError, PlanError, PlanResult};
pub use planner::{diff, ConsistencyRisk, PlanKind, ReferenceCounter, SyncPlan, SyncPlanner};
pub use record::SyncRecord;
pub use registry::{BackendFactory, BackendRegistry, BackendRegistryBuilder, FactoryContext};
pub use status::{SyncEvent, SyncStatus, TransitionError};
pub use storage::{
    BackendDescriptor, Capabilities, MemoryBackendFactory, MemoryMetadataStore, MetadataRecord,
    MetadataStore, Op, RecordFilter, StoreError, StoreResult, MEMORY_BACKEND,
};
pub use triple::{set_digest, InvalidTriple, Term, Triple, TripleHash, TripleSet};
pub use vocabulary::{EntityResolver, EntityUri, Vocabulary};

/// Sync record schema version written by this build
pub use graphkiln_config::CURRENT_SCHEMA_VERSION;
