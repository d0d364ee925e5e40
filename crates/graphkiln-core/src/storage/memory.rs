//! In-process metadata store
//!
//! Keeps every record in a `HashMap` behind a `parking_lot::RwLock`. Nothing
//! survives the process, which makes it the backend of choice for tests and
//! one-shot runs.

use super::contract::{BackendDescriptor, Capabilities, MetadataRecord, MetadataStore};
use super::error::{StoreError, StoreResult};
use super::filter::RecordFilter;
use crate::error::ConfigurationError;
use crate::registry::{BackendFactory, FactoryContext};
use async_trait::async_trait;
use graphkiln_config::{BackendConfig, CURRENT_SCHEMA_VERSION};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Registry key of the in-process backend
pub const MEMORY_BACKEND: &str = "memory";

fn memory_descriptor() -> BackendDescriptor {
    BackendDescriptor::new(
        MEMORY_BACKEND,
        1..=CURRENT_SCHEMA_VERSION,
        Capabilities::FIELD_FILTERS,
    )
}

/// In-process [`MetadataStore`]
#[derive(Debug)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, MetadataRecord>>,
    closed: AtomicBool,
    descriptor: BackendDescriptor,
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMetadataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            descriptor: memory_descriptor(),
        }
    }

    /// Same store, advertising different capabilities
    ///
    /// Lets tests exercise the paths a backend without field filters takes.
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        let mut store = Self::new();
        store.descriptor.capabilities = capabilities;
        store
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn save(&self, record: MetadataRecord) -> StoreResult<String> {
        self.ensure_open()?;
        let id = record.id.clone();
        self.records.write().insert(id.clone(), record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        self.ensure_open()?;
        Ok(self.records.read().get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.records.read().keys().cloned().collect())
    }

    async fn search(&self, filter: &RecordFilter) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        if filter.requires_field_filters() && !self.descriptor.has(Capabilities::FIELD_FILTERS) {
            return Err(StoreError::unsupported("field filters"));
        }
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| filter.matches(record))
            .map(|record| record.id.clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.records.write().remove(id);
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(records = self.len(), "Memory store closed");
        }
        Ok(())
    }

    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }
}

/// Factory registering [`MemoryMetadataStore`] under `memory`
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackendFactory;

#[async_trait]
impl BackendFactory for MemoryBackendFactory {
    fn descriptor(&self) -> BackendDescriptor {
        memory_descriptor()
    }

    fn validate(&self, config: &BackendConfig) -> Result<(), ConfigurationError> {
        match config.settings.keys().next() {
            Some(key) => Err(ConfigurationError::InvalidSettings {
                type_key: MEMORY_BACKEND.to_string(),
                reason: format!("unknown setting '{key}', the memory backend takes none"),
            }),
            None => Ok(()),
        }
    }

    async fn create(
        &self,
        _context: &FactoryContext<'_>,
    ) -> Result<Arc<dyn MetadataStore>, ConfigurationError> {
        Ok(Arc::new(MemoryMetadataStore::new()))
    }
}
