//! SQLite backend settings, read from `[backend.settings]`

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// SQLite connection settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    /// Enable write-ahead logging
    pub wal_mode: bool,
    /// How long a writer waits on a locked database
    pub busy_timeout_ms: u32,
    /// `PRAGMA cache_size` (negative values are KiB)
    pub cache_size: i32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            wal_mode: true,
            busy_timeout_ms: 5_000,
            cache_size: -8_000,
        }
    }
}

impl SqliteConfig {
    /// File-backed configuration
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// In-memory database for tests
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            wal_mode: false,
            ..Default::default()
        }
    }

    /// Whether this is an in-memory database
    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(":memory:")
    }
}

/// `$XDG_DATA_HOME/graphkiln/records.db`
fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("graphkiln")
        .join("records.db")
}
