//! Last-known-published state per document

use crate::document::DocumentId;
use crate::triple::{set_digest, Triple, TripleHash, TripleSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What was last successfully published for a document
///
/// A record with an empty hash set is a tombstone: the document was removed
/// and its owned triples retracted. Tombstones are kept rather than deleted
/// so that repeated removals stay no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub document_id: DocumentId,
    pub triple_hashes: BTreeSet<TripleHash>,
    /// The published triples, needed to build `DELETE DATA` requests
    pub triples: BTreeSet<Triple>,
    pub graph_uri: String,
    pub last_synced_at: DateTime<Utc>,
    pub schema_version: u32,
    /// A non-atomic upsert started and has not completed
    #[serde(default)]
    pub interrupted: bool,
    /// Digest over `triple_hashes`
    pub set_hash: String,
}

impl SyncRecord {
    /// Record for a successfully published triple set
    pub fn published(document_id: DocumentId, triples: &TripleSet, schema_version: u32) -> Self {
        let triple_hashes = triples.hashes();
        let set_hash = set_digest(&triple_hashes);
        Self {
            document_id,
            triple_hashes,
            triples: triples.triples.clone(),
            graph_uri: triples.graph_uri.clone(),
            last_synced_at: Utc::now(),
            schema_version,
            interrupted: false,
            set_hash,
        }
    }

    /// Tombstone for a removed document
    pub fn tombstone(document_id: DocumentId, graph_uri: impl Into<String>, schema_version: u32) -> Self {
        let triple_hashes = BTreeSet::new();
        let set_hash = set_digest(&triple_hashes);
        Self {
            document_id,
            triple_hashes,
            triples: BTreeSet::new(),
            graph_uri: graph_uri.into(),
            last_synced_at: Utc::now(),
            schema_version,
            interrupted: false,
            set_hash,
        }
    }

    /// Whether this record marks a removed document
    pub fn is_tombstone(&self) -> bool {
        self.triple_hashes.is_empty()
    }

    /// The published triples as a set scoped to their graph
    pub fn triple_set(&self) -> TripleSet {
        TripleSet {
            graph_uri: self.graph_uri.clone(),
            triples: self.triples.clone(),
        }
    }

    /// Whether the store is known to hold exactly the set with this digest
    pub fn is_current(&self, set_hash: &str) -> bool {
        !self.interrupted && self.set_hash == set_hash
    }

    /// Same record, flagged as mid-upsert
    pub fn into_interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triple::Term;

    fn set(values: &[&str]) -> TripleSet {
        TripleSet::from_triples(
            "urn:g",
            values.iter().map(|v| {
                Triple::new(Term::iri("urn:doc:d1"), Term::iri("urn:p:title"), Term::literal(*v))
            }),
        )
    }

    #[test]
    fn test_published_record_tracks_hashes() {
        let triples = set(&["X"]);
        let record = SyncRecord::published(DocumentId::from("d1"), &triples, 1);
        assert_eq!(record.triple_hashes, triples.hashes());
        assert!(record.is_current(&triples.set_hash()));
        assert!(!record.is_current(&set(&["Y"]).set_hash()));
        assert!(!record.is_tombstone());
        assert_eq!(record.triple_set(), triples);
    }

    #[test]
    fn test_tombstone_matches_empty_set() {
        let record = SyncRecord::tombstone(DocumentId::from("d1"), "urn:g", 1);
        assert!(record.is_tombstone());
        assert!(record.is_current(&TripleSet::new("urn:g").set_hash()));
    }

    #[test]
    fn test_interrupted_record_is_never_current() {
        let triples = set(&["X"]);
        let record = SyncRecord::published(DocumentId::from("d1"), &triples, 1).into_interrupted();
        assert!(!record.is_current(&triples.set_hash()));
    }

    #[test]
    fn test_interrupted_defaults_when_absent() {
        let record = SyncRecord::published(DocumentId::from("d1"), &set(&["X"]), 1);
        let mut json = serde_json::to_value(&record).unwrap();
        json.as_object_mut().unwrap().remove("interrupted");
        let back: SyncRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
