//! Top-level configuration and loading
//!
//! Resolution order, later wins:
//! 1. built-in defaults
//! 2. the TOML file (explicit path, or `$XDG_CONFIG_HOME/graphkiln/config.toml` if present)
//! 3. environment overrides (`GRAPHKILN_*`)

use crate::components::{BackendConfig, EndpointConfig, GraphConfig, SyncSettings, VocabularyConfig};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding `endpoint.password`
pub const ENV_ENDPOINT_PASSWORD: &str = "GRAPHKILN_ENDPOINT_PASSWORD";
/// Environment variable overriding `backend.type_key`
pub const ENV_BACKEND: &str = "GRAPHKILN_BACKEND";
/// Environment variable overriding `graph.graph_uri`
pub const ENV_GRAPH_URI: &str = "GRAPHKILN_GRAPH_URI";

/// Complete graphkiln configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphkilnConfig {
    /// Remote SPARQL endpoint
    pub endpoint: EndpointConfig,
    /// Target named graph
    pub graph: GraphConfig,
    /// Worker pool, batching and retry
    pub sync: SyncSettings,
    /// Metadata backend selection
    pub backend: BackendConfig,
    /// Vocabulary namespaces
    pub vocabulary: VocabularyConfig,
}

impl GraphkilnConfig {
    /// Default config path: `$XDG_CONFIG_HOME/graphkiln/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
            })
            .join("graphkiln")
            .join("config.toml")
    }

    /// Load, apply environment overrides and validate
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    debug!(path = %default.display(), "No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without env overrides or validation
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&content)
    }

    /// Parse TOML content without env overrides or validation
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `GRAPHKILN_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(ENV_ENDPOINT_PASSWORD) {
            debug!("Endpoint password taken from environment");
            self.endpoint.password = Some(password);
        }
        if let Ok(backend) = std::env::var(ENV_BACKEND) {
            debug!(backend = %backend, "Backend type overridden from environment");
            self.backend.type_key = backend;
        }
        if let Ok(graph) = std::env::var(ENV_GRAPH_URI) {
            debug!(graph = %graph, "Graph URI overridden from environment");
            self.graph.graph_uri = graph;
        }
    }

    /// Validate every section, collecting all problems
    pub fn validate(&self) -> ConfigResult<()> {
        let mut problems = Vec::new();
        self.endpoint.validate(&mut problems);
        self.graph.validate(&mut problems);
        self.sync.validate(&mut problems);
        self.backend.validate(&mut problems);
        self.vocabulary.validate(&mut problems);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
