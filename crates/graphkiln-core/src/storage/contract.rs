//! The metadata store contract every backend satisfies

use super::error::{StoreError, StoreResult};
use super::filter::RecordFilter;
use async_trait::async_trait;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// The unit a metadata store persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Unique id, stable across saves
    pub id: String,
    /// Logical collection (`sync_record`, `entity_ref`, ...)
    pub keyspace: String,
    /// JSON object payload
    pub payload: Value,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl MetadataRecord {
    /// Create a record stamped with the current time
    pub fn new(id: impl Into<String>, keyspace: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            keyspace: keyspace.into(),
            payload,
            updated_at: Utc::now(),
        }
    }

    /// Serialize a typed payload into a record
    pub fn encode<T: Serialize>(
        id: impl Into<String>,
        keyspace: impl Into<String>,
        payload: &T,
    ) -> StoreResult<Self> {
        Ok(Self::new(id, keyspace, serde_json::to_value(payload)?))
    }

    /// Deserialize the payload
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        T::deserialize(&self.payload).map_err(|e| {
            StoreError::serialization(format!("record {}: {}", self.id, e))
        })
    }

    /// Value at a dotted path inside the payload
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.payload, |value, key| value.as_object()?.get(key))
    }
}

bitflags! {
    /// What a backend can do beyond the base contract
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// `search` evaluates [`RecordFilter::Field`] predicates
        const FIELD_FILTERS = 1;
        /// Data survives a process restart
        const DURABLE = 1 << 1;
        /// Storage lives behind the network
        const REMOTE = 1 << 2;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        if names.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Declared identity of a backend implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Unique registry key
    pub type_key: String,
    /// Sync record schema versions this backend can store
    pub supported_schema_versions: RangeInclusive<u32>,
    /// Capability flags
    pub capabilities: Capabilities,
}

impl BackendDescriptor {
    /// Create a descriptor
    pub fn new(
        type_key: impl Into<String>,
        supported_schema_versions: RangeInclusive<u32>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            type_key: type_key.into(),
            supported_schema_versions,
            capabilities,
        }
    }

    /// Whether a schema version is supported
    pub fn supports_version(&self, version: u32) -> bool {
        self.supported_schema_versions.contains(&version)
    }

    /// Whether the backend has every given capability
    pub fn has(&self, capabilities: Capabilities) -> bool {
        self.capabilities.contains(capabilities)
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (schema v{}..=v{}, {})",
            self.type_key,
            self.supported_schema_versions.start(),
            self.supported_schema_versions.end(),
            self.capabilities
        )
    }
}

/// Versioned key/value metadata storage
///
/// Backends own their storage medium but never interpret payloads beyond
/// what a [`RecordFilter`] asks for.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; concurrent saves of different ids
/// must not corrupt each other.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a record, overwriting any record with the same id
    async fn save(&self, record: MetadataRecord) -> StoreResult<String>;

    /// Get a record by id
    ///
    /// Returns `None` if the record doesn't exist.
    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>>;

    /// All known ids, in no particular order
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// Ids matching a predicate
    async fn search(&self, filter: &RecordFilter) -> StoreResult<Vec<String>>;

    /// Delete a record by id
    ///
    /// This is idempotent: deleting a non-existent record succeeds.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Release underlying resources
    ///
    /// Idempotent. Every later operation fails with [`StoreError::Closed`].
    async fn close(&self) -> StoreResult<()>;

    /// Descriptor this backend registered with
    fn descriptor(&self) -> &BackendDescriptor;
}

#[async_trait]
impl<T: MetadataStore + ?Sized> MetadataStore for Arc<T> {
    async fn save(&self, record: MetadataRecord) -> StoreResult<String> {
        (**self).save(record).await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        (**self).get(id).await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        (**self).list().await
    }

    async fn search(&self, filter: &RecordFilter) -> StoreResult<Vec<String>> {
        (**self).search(filter).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        (**self).delete(id).await
    }

    async fn close(&self) -> StoreResult<()> {
        (**self).close().await
    }

    fn descriptor(&self) -> &BackendDescriptor {
        (**self).descriptor()
    }
}
