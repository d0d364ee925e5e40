//! Metadata storage contract
//!
//! Everything graphkiln persists locally (sync records, entity reference
//! edges) goes through [`MetadataStore`]. Backends register with the
//! [`BackendRegistry`](crate::registry::BackendRegistry) and are selected by
//! configuration at startup.
//!
//! ## Key Components
//!
//! - **MetadataStore**: the async contract every backend satisfies
//! - **RecordFilter**: search predicates, evaluated natively or in memory
//! - **BackendDescriptor**: type key, schema versions and capability flags
//! - **MemoryMetadataStore**: the in-process reference backend

pub mod contract;
pub mod error;
pub mod filter;
pub mod memory;

pub use contract::{BackendDescriptor, Capabilities, MetadataRecord, MetadataStore};
pub use error::{StoreError, StoreResult};
pub use filter::{Op, RecordFilter};
pub use memory::{MemoryBackendFactory, MemoryMetadataStore, MEMORY_BACKEND};
