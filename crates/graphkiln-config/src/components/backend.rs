//! Metadata backend selection
//!
//! Only the shape is checked here. Whether `type_key` names a registered
//! backend, and whether that backend accepts `schema_version`, is decided by the
//! backend registry in graphkiln-core.
//!
//! ```toml
//! [backend]
//! type_key = "sqlite"
//! schema_version = 1
//!
//! [backend.settings]
//! path = "~/.local/share/graphkiln/records.db"
//! ```

use serde::{Deserialize, Serialize};

/// Backend type key used when none is configured
pub const DEFAULT_BACKEND: &str = "sqlite";

/// Sync record schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Registered backend type key (`memory`, `sqlite`, `sparql`, ...)
    pub type_key: String,

    /// Sync record schema version the backend must support
    pub schema_version: u32,

    /// Backend-specific settings, interpreted by the backend's factory
    pub settings: toml::Table,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            type_key: DEFAULT_BACKEND.to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
            settings: toml::Table::new(),
        }
    }
}

impl BackendConfig {
    /// Look up a string setting
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(toml::Value::as_str)
    }

    /// Deserialize the settings table into a backend-specific type
    pub fn settings_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, toml::de::Error> {
        toml::Value::Table(self.settings.clone()).try_into()
    }

    pub(crate) fn validate(&self, problems: &mut Vec<String>) {
        if self.type_key.trim().is_empty() {
            problems.push("backend.type_key must not be empty".to_string());
        }
        if self.schema_version == 0 {
            problems.push("backend.schema_version must be >= 1".to_string());
        }
    }
}
