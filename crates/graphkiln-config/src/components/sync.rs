//! Sync engine tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool, batching and retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Maximum triple operations per update request
    ///
    /// Batches are built from whole documents. A document whose plan alone
    /// exceeds this limit is sent on its own.
    pub batch_size: usize,

    /// Number of batches processed concurrently
    pub workers: usize,

    /// Retries after the first attempt for transient transport failures
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    pub base_backoff_ms: u64,

    /// Upper bound on any single retry delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            workers: num_workers_default(),
            max_retries: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

fn num_workers_default() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4)
}

impl SyncSettings {
    /// Base backoff as Duration
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Max backoff as Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub(crate) fn validate(&self, problems: &mut Vec<String>) {
        if self.batch_size == 0 {
            problems.push("sync.batch_size must be greater than 0".to_string());
        }
        if self.workers == 0 {
            problems.push("sync.workers must be greater than 0".to_string());
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            problems.push(format!(
                "sync.max_backoff_ms ({}) must be >= sync.base_backoff_ms ({})",
                self.max_backoff_ms, self.base_backoff_ms
            ));
        }
    }
}
