//! Persisted sync state, on top of any [`MetadataStore`]
//!
//! Two keyspaces:
//!
//! - `sync_record`: one [`SyncRecord`] per document, id `sync_record/{doc}`
//! - `entity_ref`: one edge per document/entity pair, id
//!   `entity_ref/{doc}/{digest(entity)}`, payload `{document_id, entity}`
//!
//! Document ids are percent-encoded in record ids, so an id prefix search for
//! one document never matches another.

use async_trait::async_trait;
use graphkiln_core::{
    DocumentId, MetadataRecord, MetadataStore, RecordFilter, ReferenceCounter, StoreError,
    StoreResult, SyncRecord, SyncStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub const SYNC_RECORD_KEYSPACE: &str = "sync_record";
pub const ENTITY_REF_KEYSPACE: &str = "entity_ref";

fn record_id(document_id: &DocumentId) -> String {
    format!("{SYNC_RECORD_KEYSPACE}/{}", urlencoding::encode(document_id.as_str()))
}

fn edge_prefix(document_id: &DocumentId) -> String {
    format!("{ENTITY_REF_KEYSPACE}/{}/", urlencoding::encode(document_id.as_str()))
}

fn edge_id(document_id: &DocumentId, entity: &str) -> String {
    let digest = blake3::hash(entity.as_bytes()).to_hex();
    format!("{}{}", edge_prefix(document_id), &digest.as_str()[..16])
}

/// Document/entity edge payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub document_id: DocumentId,
    pub entity: String,
}

/// Where a document stands, judged from its record and current content hash
///
/// Without a hash, a live record counts as synced.
pub fn classify(record: Option<&SyncRecord>, current_hash: Option<&str>) -> SyncStatus {
    match record {
        None => SyncStatus::Unsynced,
        Some(record) if record.is_tombstone() && !record.interrupted => SyncStatus::Tombstoned,
        Some(record) if record.interrupted => SyncStatus::StaleDetected,
        Some(record) => match current_hash {
            Some(hash) if hash != record.set_hash => SyncStatus::StaleDetected,
            _ => SyncStatus::Synced,
        },
    }
}

/// Sync records and entity reference edges
#[derive(Clone)]
pub struct SyncRecordStore {
    store: Arc<dyn MetadataStore>,
    schema_version: u32,
}

impl std::fmt::Debug for SyncRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRecordStore")
            .field("backend", &self.store.descriptor().type_key)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

impl SyncRecordStore {
    /// Wrap the active backend; records are written with `schema_version`
    pub fn new(store: Arc<dyn MetadataStore>, schema_version: u32) -> Self {
        Self {
            store,
            schema_version,
        }
    }

    /// The backend underneath
    pub fn backend(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Schema version stamped on new records
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Last published state of a document
    pub async fn load(&self, document_id: &DocumentId) -> StoreResult<Option<SyncRecord>> {
        let Some(raw) = self.store.get(&record_id(document_id)).await? else {
            return Ok(None);
        };
        let record: SyncRecord = raw.decode()?;
        if record.schema_version > self.schema_version {
            return Err(StoreError::SchemaMismatch {
                found: record.schema_version,
                expected: self.schema_version,
            });
        }
        Ok(Some(record))
    }

    /// Overwrite a document's record
    pub async fn save(&self, record: &SyncRecord) -> StoreResult<()> {
        let raw = MetadataRecord::encode(record_id(&record.document_id), SYNC_RECORD_KEYSPACE, record)?;
        self.store.save(raw).await?;
        debug!(
            document_id = %record.document_id,
            triples = record.triples.len(),
            tombstone = record.is_tombstone(),
            "Saved sync record"
        );
        Ok(())
    }

    /// Flag a document's live record as mid-upsert
    ///
    /// Called before a separate delete request goes out. Returns whether a
    /// record was flagged.
    pub async fn mark_interrupted(&self, document_id: &DocumentId) -> StoreResult<bool> {
        match self.load(document_id).await? {
            Some(record) if !record.is_tombstone() && !record.interrupted => {
                self.save(&record.into_interrupted()).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Every document with a record, tombstones included, in id order
    pub async fn document_ids(&self) -> StoreResult<Vec<DocumentId>> {
        let prefix = format!("{SYNC_RECORD_KEYSPACE}/");
        let mut ids = Vec::new();
        for id in self.store.search(&RecordFilter::keyspace(SYNC_RECORD_KEYSPACE)).await? {
            let encoded = id.strip_prefix(&prefix).unwrap_or(&id);
            let decoded = urlencoding::decode(encoded)
                .map_err(|e| StoreError::serialization(format!("record id {id}: {e}")))?;
            ids.push(DocumentId::new(decoded.into_owned()));
        }
        ids.sort();
        Ok(ids)
    }

    /// Records of documents that are published and not tombstoned
    pub async fn live_documents(&self) -> StoreResult<Vec<SyncRecord>> {
        let mut live = Vec::new();
        for document_id in self.document_ids().await? {
            if let Some(record) = self.load(&document_id).await? {
                if !record.is_tombstone() {
                    live.push(record);
                }
            }
        }
        Ok(live)
    }

    /// Entities a document is recorded as referencing
    pub async fn entity_refs(&self, document_id: &DocumentId) -> StoreResult<BTreeSet<String>> {
        let filter = RecordFilter::and(vec![
            RecordFilter::keyspace(ENTITY_REF_KEYSPACE),
            RecordFilter::id_prefix(edge_prefix(document_id)),
        ]);
        let mut entities = BTreeSet::new();
        for id in self.store.search(&filter).await? {
            if let Some(raw) = self.store.get(&id).await? {
                entities.insert(raw.decode::<EntityRef>()?.entity);
            }
        }
        Ok(entities)
    }

    /// Documents with an edge to `entity`
    pub async fn referencing_documents(&self, entity: &str) -> StoreResult<BTreeSet<DocumentId>> {
        let filter = RecordFilter::and(vec![
            RecordFilter::keyspace(ENTITY_REF_KEYSPACE),
            RecordFilter::field_eq("entity", json!(entity)),
        ]);
        let prefix = format!("{ENTITY_REF_KEYSPACE}/");
        let mut documents = BTreeSet::new();
        for id in self.store.search(&filter).await? {
            let encoded = id
                .strip_prefix(&prefix)
                .and_then(|rest| rest.rsplit_once('/'))
                .map(|(document, _digest)| document)
                .ok_or_else(|| StoreError::serialization(format!("malformed edge id {id}")))?;
            let decoded = urlencoding::decode(encoded)
                .map_err(|e| StoreError::serialization(format!("edge id {id}: {e}")))?;
            documents.insert(DocumentId::new(decoded.into_owned()));
        }
        Ok(documents)
    }

    /// Make a document's edges exactly `entities`
    pub async fn replace_entity_refs(
        &self,
        document_id: &DocumentId,
        entities: &BTreeSet<String>,
    ) -> StoreResult<()> {
        let current = self.entity_refs(document_id).await?;

        for stale in current.difference(entities) {
            self.store.delete(&edge_id(document_id, stale)).await?;
        }
        for added in entities.difference(&current) {
            let edge = EntityRef {
                document_id: document_id.clone(),
                entity: added.clone(),
            };
            let raw = MetadataRecord::encode(edge_id(document_id, added), ENTITY_REF_KEYSPACE, &edge)?;
            self.store.save(raw).await?;
        }
        Ok(())
    }

    /// Status of a document given the hash of its current triple set
    pub async fn status_of(
        &self,
        document_id: &DocumentId,
        current_hash: Option<&str>,
    ) -> StoreResult<SyncStatus> {
        Ok(classify(self.load(document_id).await?.as_ref(), current_hash))
    }
}

#[async_trait]
impl ReferenceCounter for SyncRecordStore {
    async fn count_other_references(
        &self,
        entity: &str,
        excluding: &DocumentId,
    ) -> StoreResult<usize> {
        let filter = RecordFilter::and(vec![
            RecordFilter::keyspace(ENTITY_REF_KEYSPACE),
            RecordFilter::field_eq("entity", json!(entity)),
            RecordFilter::field_ne("document_id", json!(excluding.as_str())),
        ]);
        Ok(self.store.search(&filter).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphkiln_core::{Capabilities, MemoryMetadataStore, Term, Triple, TripleSet};

    fn store() -> SyncRecordStore {
        SyncRecordStore::new(Arc::new(MemoryMetadataStore::new()), 1)
    }

    fn triples(value: &str) -> TripleSet {
        TripleSet::from_triples(
            "urn:g",
            [Triple::new(Term::iri("urn:doc:d1"), Term::iri("urn:p:title"), Term::literal(value))],
        )
    }

    #[tokio::test]
    async fn test_save_load_and_ids() {
        let records = store();
        let d1 = DocumentId::from("notes/a b.md");
        assert!(records.load(&d1).await.unwrap().is_none());

        let record = SyncRecord::published(d1.clone(), &triples("X"), 1);
        records.save(&record).await.unwrap();
        records
            .save(&SyncRecord::tombstone(DocumentId::from("gone"), "urn:g", 1))
            .await
            .unwrap();

        assert_eq!(records.load(&d1).await.unwrap(), Some(record));
        assert_eq!(
            records.document_ids().await.unwrap(),
            vec![DocumentId::from("gone"), d1.clone()]
        );
        let live = records.live_documents().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].document_id, d1);
    }

    #[tokio::test]
    async fn test_newer_record_schema_refused() {
        let records = store();
        let d1 = DocumentId::from("d1");
        SyncRecordStore::new(records.backend().clone(), 2)
            .save(&SyncRecord::published(d1.clone(), &triples("X"), 2))
            .await
            .unwrap();

        let err = records.load(&d1).await.unwrap_err();
        assert_eq!(err, StoreError::SchemaMismatch { found: 2, expected: 1 });
    }

    #[tokio::test]
    async fn test_entity_refs_replace_and_count() {
        let records = store();
        let d1 = DocumentId::from("d1");
        let d10 = DocumentId::from("d10");
        let e = "https://graphkiln.dev/entity/person/ada".to_string();
        let f = "https://graphkiln.dev/entity/place/london".to_string();

        records.replace_entity_refs(&d1, &BTreeSet::from([e.clone(), f.clone()])).await.unwrap();
        records.replace_entity_refs(&d10, &BTreeSet::from([e.clone()])).await.unwrap();

        // "d1/" must not pick up d10's edges
        assert_eq!(records.entity_refs(&d1).await.unwrap().len(), 2);
        assert_eq!(records.count_other_references(&e, &d1).await.unwrap(), 1);
        assert_eq!(records.count_other_references(&f, &d1).await.unwrap(), 0);

        records.replace_entity_refs(&d10, &BTreeSet::new()).await.unwrap();
        assert_eq!(records.count_other_references(&e, &d1).await.unwrap(), 0);
        assert!(records.entity_refs(&d10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_referencing_documents_decodes_ids() {
        let records = store();
        let e = "https://graphkiln.dev/entity/person/ada".to_string();
        let nested = DocumentId::from("notes/2024 draft");
        records.replace_entity_refs(&nested, &BTreeSet::from([e.clone()])).await.unwrap();
        records
            .replace_entity_refs(&DocumentId::from("d2"), &BTreeSet::from([e.clone()]))
            .await
            .unwrap();

        let documents = records.referencing_documents(&e).await.unwrap();
        assert_eq!(documents, BTreeSet::from([DocumentId::from("d2"), nested]));
        assert!(records.referencing_documents("urn:nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counting_without_field_filters_is_unsupported() {
        let records = SyncRecordStore::new(
            Arc::new(MemoryMetadataStore::with_capabilities(Capabilities::empty())),
            1,
        );
        let err = records
            .count_other_references("urn:e", &DocumentId::from("d1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_status_and_interruption() {
        let records = store();
        let d1 = DocumentId::from("d1");
        let x = triples("X");
        assert_eq!(records.status_of(&d1, None).await.unwrap(), SyncStatus::Unsynced);

        records.save(&SyncRecord::published(d1.clone(), &x, 1)).await.unwrap();
        assert_eq!(records.status_of(&d1, Some(&x.set_hash())).await.unwrap(), SyncStatus::Synced);
        assert_eq!(
            records.status_of(&d1, Some(&triples("Y").set_hash())).await.unwrap(),
            SyncStatus::StaleDetected
        );

        assert!(records.mark_interrupted(&d1).await.unwrap());
        assert!(!records.mark_interrupted(&d1).await.unwrap());
        assert_eq!(records.status_of(&d1, Some(&x.set_hash())).await.unwrap(), SyncStatus::StaleDetected);

        records.save(&SyncRecord::tombstone(d1.clone(), "urn:g", 1)).await.unwrap();
        assert_eq!(records.status_of(&d1, None).await.unwrap(), SyncStatus::Tombstoned);
        assert!(!records.mark_interrupted(&d1).await.unwrap());
    }
}
