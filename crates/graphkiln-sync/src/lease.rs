//! Per-document leases
//!
//! At most one sync per `document_id` is in flight. A batch takes all of its
//! leases in ascending id order, so two batches sharing documents can never
//! wait on each other in a cycle.

use dashmap::DashMap;
use graphkiln_core::DocumentId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

type Locks = Arc<DashMap<DocumentId, Arc<Mutex<()>>>>;

/// Held from planning until the record update; released on drop
pub struct Lease {
    document_id: DocumentId,
    locks: Locks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Lease {
    /// Document this lease covers
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("document_id", &self.document_id).finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        drop(self.guard.take());
        // only the map still holds the lock once nobody waits on it
        self.locks
            .remove_if(&self.document_id, |_, lock| Arc::strong_count(lock) == 1);
        trace!(document_id = %self.document_id, "Lease released");
    }
}

/// Registry of per-document locks
///
/// Entries live only while some task holds or waits for a lease.
#[derive(Debug, Default)]
pub struct DocumentLeases {
    locks: Locks,
}

impl DocumentLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lease on one document
    pub async fn acquire(&self, document_id: &DocumentId) -> Lease {
        // clone the Arc out so no DashMap shard lock is held across the await
        let lock = self
            .locks
            .entry(document_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        trace!(document_id = %document_id, "Lease acquired");
        Lease {
            document_id: document_id.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Wait for the leases on every listed document, in ascending id order
    pub async fn acquire_all<'a>(
        &self,
        document_ids: impl IntoIterator<Item = &'a DocumentId>,
    ) -> Vec<Lease> {
        let ordered: BTreeSet<&DocumentId> = document_ids.into_iter().collect();
        let mut leases = Vec::with_capacity(ordered.len());
        for document_id in ordered {
            leases.push(self.acquire(document_id).await);
        }
        leases
    }

    /// Whether some task holds the lease right now
    pub fn is_held(&self, document_id: &DocumentId) -> bool {
        self.locks
            .get(document_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Documents with a lease held or awaited
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}
