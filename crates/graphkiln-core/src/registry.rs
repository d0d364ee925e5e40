//! Backend registry
//!
//! Backends are registered once at startup through a builder, then the
//! registry is consumed to produce the single active backend. Lookup is
//! explicit: an unknown type key or unsupported schema version is a
//! [`ConfigurationError`], never a fallback to some other backend.
//!
//! ```ignore
//! let registry = BackendRegistry::builder()
//!     .register(MemoryBackendFactory)?
//!     .register(SqliteBackendFactory)?
//!     .build();
//! let store = registry.instantiate(&config, vocabulary).await?;
//! ```

use crate::error::ConfigurationError;
use crate::storage::{BackendDescriptor, MetadataStore};
use crate::vocabulary::Vocabulary;
use async_trait::async_trait;
use graphkiln_config::{BackendConfig, GraphkilnConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// What a factory gets to build its backend from
#[derive(Debug)]
pub struct FactoryContext<'a> {
    /// Full validated configuration
    pub config: &'a GraphkilnConfig,
    /// Process-wide vocabulary
    pub vocabulary: Arc<Vocabulary>,
}

impl FactoryContext<'_> {
    /// The `[backend]` section
    pub fn backend(&self) -> &BackendConfig {
        &self.config.backend
    }
}

/// Constructor for one backend type
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Descriptor the backend registers with
    fn descriptor(&self) -> BackendDescriptor;

    /// Check backend-specific settings without constructing anything
    fn validate(&self, _config: &BackendConfig) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Construct the backend
    async fn create(
        &self,
        context: &FactoryContext<'_>,
    ) -> Result<Arc<dyn MetadataStore>, ConfigurationError>;
}

/// Accumulates factories, rejecting duplicate type keys
#[derive(Default)]
pub struct BackendRegistryBuilder {
    factories: BTreeMap<String, Box<dyn BackendFactory>>,
}

impl std::fmt::Debug for BackendRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistryBuilder")
            .field("backends", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistryBuilder {
    /// Register a factory under its descriptor's type key
    pub fn register<F>(mut self, factory: F) -> Result<Self, ConfigurationError>
    where
        F: BackendFactory + 'static,
    {
        let type_key = factory.descriptor().type_key;
        if self.factories.contains_key(&type_key) {
            return Err(ConfigurationError::DuplicateRegistration(type_key));
        }
        self.factories.insert(type_key, Box::new(factory));
        Ok(self)
    }

    /// Build the immutable registry
    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            factories: self.factories,
        }
    }
}

/// Immutable map from type key to factory
pub struct BackendRegistry {
    factories: BTreeMap<String, Box<dyn BackendFactory>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Start a builder
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Descriptors of every registered backend, ordered by type key
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.factories.values().map(|f| f.descriptor()).collect()
    }

    /// Whether a type key is registered
    pub fn contains(&self, type_key: &str) -> bool {
        self.factories.contains_key(type_key)
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run every check [`instantiate`](Self::instantiate) runs, without constructing
    pub fn validate(&self, config: &BackendConfig) -> Result<BackendDescriptor, ConfigurationError> {
        let factory = self.factories.get(&config.type_key).ok_or_else(|| {
            ConfigurationError::UnknownBackend {
                type_key: config.type_key.clone(),
                available: self.factories.keys().cloned().collect(),
            }
        })?;

        let descriptor = factory.descriptor();
        if !descriptor.supports_version(config.schema_version) {
            return Err(ConfigurationError::UnsupportedSchemaVersion {
                type_key: config.type_key.clone(),
                requested: config.schema_version,
                supported: descriptor.supported_schema_versions,
            });
        }

        factory.validate(config)?;
        Ok(descriptor)
    }

    /// Validate and construct the configured backend
    ///
    /// Consumes the registry, so one registry yields at most one active backend.
    pub async fn instantiate(
        mut self,
        config: &GraphkilnConfig,
        vocabulary: Arc<Vocabulary>,
    ) -> Result<Arc<dyn MetadataStore>, ConfigurationError> {
        let descriptor = self.validate(&config.backend)?;
        let factory = self
            .factories
            .remove(&descriptor.type_key)
            .ok_or_else(|| ConfigurationError::UnknownBackend {
                type_key: descriptor.type_key.clone(),
                available: Vec::new(),
            })?;

        let context = FactoryContext { config, vocabulary };
        let store = factory.create(&context).await?;
        info!(
            backend = %descriptor.type_key,
            schema_version = config.backend.schema_version,
            capabilities = %descriptor.capabilities,
            "Metadata backend ready"
        );
        Ok(store)
    }
}
