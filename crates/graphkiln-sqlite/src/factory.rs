//! Registry factory for the `sqlite` backend

use crate::config::SqliteConfig;
use crate::connection::SqlitePool;
use crate::schema;
use crate::store::SqliteMetadataStore;
use async_trait::async_trait;
use graphkiln_config::{BackendConfig, CURRENT_SCHEMA_VERSION};
use graphkiln_core::storage::{BackendDescriptor, Capabilities, MetadataStore, StoreError};
use graphkiln_core::{BackendFactory, ConfigurationError, FactoryContext};
use std::sync::Arc;

/// Registry key of the SQLite backend
pub const SQLITE_BACKEND: &str = "sqlite";

pub(crate) fn sqlite_descriptor() -> BackendDescriptor {
    BackendDescriptor::new(
        SQLITE_BACKEND,
        1..=CURRENT_SCHEMA_VERSION,
        Capabilities::FIELD_FILTERS | Capabilities::DURABLE,
    )
}

/// Builds a [`SqliteMetadataStore`] from `[backend.settings]`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBackendFactory;

impl SqliteBackendFactory {
    fn settings(config: &BackendConfig) -> Result<SqliteConfig, ConfigurationError> {
        config
            .settings_as::<SqliteConfig>()
            .map_err(|e| ConfigurationError::InvalidSettings {
                type_key: SQLITE_BACKEND.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl BackendFactory for SqliteBackendFactory {
    fn descriptor(&self) -> BackendDescriptor {
        sqlite_descriptor()
    }

    fn validate(&self, config: &BackendConfig) -> Result<(), ConfigurationError> {
        let settings = Self::settings(config)?;
        if settings.path.as_os_str().is_empty() {
            return Err(ConfigurationError::InvalidSettings {
                type_key: SQLITE_BACKEND.to_string(),
                reason: "path must not be empty".to_string(),
            });
        }
        Ok(())
    }

    async fn create(
        &self,
        context: &FactoryContext<'_>,
    ) -> Result<Arc<dyn MetadataStore>, ConfigurationError> {
        let settings = Self::settings(context.backend())?;
        let record_schema = context.backend().schema_version;
        let construction = |source: StoreError| ConfigurationError::Construction {
            type_key: SQLITE_BACKEND.to_string(),
            source,
        };

        let pool = tokio::task::spawn_blocking(move || {
            let pool = SqlitePool::new(settings)?;
            pool.with_connection(|conn| schema::ensure_record_schema(conn, record_schema))?;
            Ok::<_, crate::SqliteError>(pool)
        })
        .await
        .map_err(|e| construction(StoreError::Backend(e.to_string())))?
        .map_err(|e| construction(e.into()))?;

        Ok(Arc::new(SqliteMetadataStore::new(pool)))
    }
}
