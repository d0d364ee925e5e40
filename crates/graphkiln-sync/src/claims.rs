//! Entity references claimed by the documents of one run
//!
//! Entity edges are only written once a document's upsert has gone through,
//! so while a run is in progress the stored edges describe the previous run.
//! [`RunReferences`] answers the planner from the run's own snapshots for
//! every document in the run, and from the stored edges for everyone else.

use crate::records::SyncRecordStore;
use async_trait::async_trait;
use graphkiln_core::{DocumentId, DocumentSnapshot, ReferenceCounter, StoreResult, Vocabulary};
use std::collections::{BTreeSet, HashMap};

/// Which run documents reference which entities
#[derive(Debug, Default)]
pub struct RunClaims {
    documents: BTreeSet<DocumentId>,
    entities: HashMap<String, BTreeSet<DocumentId>>,
}

impl RunClaims {
    /// Collect the claims of every snapshot; removals claim nothing
    pub fn collect<'a>(
        snapshots: impl IntoIterator<Item = &'a DocumentSnapshot>,
        vocabulary: &Vocabulary,
    ) -> Self {
        let mut claims = Self::default();
        for snapshot in snapshots {
            claims.documents.insert(snapshot.document_id.clone());
            if snapshot.is_removal() {
                continue;
            }
            for entity in snapshot.referenced_entities(vocabulary) {
                claims
                    .entities
                    .entry(entity)
                    .or_default()
                    .insert(snapshot.document_id.clone());
            }
        }
        claims
    }

    /// Whether `document_id` is part of the run
    pub fn covers(&self, document_id: &DocumentId) -> bool {
        self.documents.contains(document_id)
    }

    /// Run documents other than `excluding` that reference `entity`
    pub fn claimants(&self, entity: &str, excluding: &DocumentId) -> usize {
        self.entities
            .get(entity)
            .map_or(0, |documents| documents.iter().filter(|d| *d != excluding).count())
    }
}

/// Reference counts as they will stand once the run completes
#[derive(Debug)]
pub struct RunReferences<'a> {
    records: &'a SyncRecordStore,
    claims: &'a RunClaims,
}

impl<'a> RunReferences<'a> {
    pub fn new(records: &'a SyncRecordStore, claims: &'a RunClaims) -> Self {
        Self { records, claims }
    }
}

#[async_trait]
impl ReferenceCounter for RunReferences<'_> {
    async fn count_other_references(
        &self,
        entity: &str,
        excluding: &DocumentId,
    ) -> StoreResult<usize> {
        let in_run = self.claims.claimants(entity, excluding);
        if in_run > 0 {
            return Ok(in_run);
        }
        let outside = self
            .records
            .referencing_documents(entity)
            .await?
            .into_iter()
            .filter(|document_id| document_id != excluding && !self.claims.covers(document_id))
            .count();
        Ok(outside)
    }
}
