//! Subcommand implementations
//!
//! Each returns `Ok(false)` when the command ran but the outcome should fail
//! the process.

pub mod backends;
pub mod status;
pub mod sync;
pub mod verify;

use anyhow::{Context, Result};
use graphkiln_config::GraphkilnConfig;
use graphkiln_sync::{default_registry, SyncEngine};

/// Validate the configuration and build an engine for it
pub(crate) async fn open_engine(config: &GraphkilnConfig) -> Result<SyncEngine> {
    let registry = default_registry().context("building backend registry")?;
    SyncEngine::from_config(config, registry)
        .await
        .with_context(|| format!("opening '{}' backend", config.backend.type_key))
}
