//! Per-document sync status state machine
//!
//! ```text
//! Unsynced ──Start──▶ Syncing ──Succeeded──▶ Synced ──ContentChanged──▶ StaleDetected
//!    ▲                   │                                                    │
//!    └──────Failed───────┘◀──────────────────────Start────────────────────────┘
//! ```
//!
//! `Removed` leads to `Tombstoned` from `Syncing`, `Synced`, `StaleDetected`
//! and `Tombstoned` itself. A tombstoned document that reappears re-enters
//! `Syncing` on `Start`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a document stands relative to the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never published, or the last attempt failed
    Unsynced,
    /// A sync holds the document's lease
    Syncing,
    /// The store holds exactly the recorded triple set
    Synced,
    /// Current content differs from what was published
    StaleDetected,
    /// Removed from the corpus and retracted
    Tombstoned,
}

/// What happened to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEvent {
    /// A sync began
    Start,
    /// Upsert and record update completed
    Succeeded,
    /// The sync failed after retries
    Failed,
    /// A fresh triple set hash differs from the recorded one
    ContentChanged,
    /// The document was retracted
    Removed,
}

/// An event that is not valid in the current status
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid sync transition: {event:?} while {from}")]
pub struct TransitionError {
    pub from: SyncStatus,
    pub event: SyncEvent,
}

impl SyncStatus {
    /// Apply an event
    pub fn transition(self, event: SyncEvent) -> Result<SyncStatus, TransitionError> {
        use SyncEvent::*;
        use SyncStatus::*;

        match (self, event) {
            (Unsynced | StaleDetected | Tombstoned, Start) => Ok(Syncing),
            (Syncing, Succeeded) => Ok(Synced),
            (Syncing, Failed) => Ok(Unsynced),
            (Syncing | Synced | StaleDetected | Tombstoned, Removed) => Ok(Tombstoned),
            (Synced, ContentChanged) => Ok(StaleDetected),
            (from, event) => Err(TransitionError { from, event }),
        }
    }

    /// Whether a run should pick the document up
    pub fn needs_sync(self) -> bool {
        matches!(self, SyncStatus::Unsynced | SyncStatus::StaleDetected)
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Unsynced => "unsynced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::StaleDetected => "stale",
            SyncStatus::Tombstoned => "tombstoned",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
