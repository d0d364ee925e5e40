//! Document identity and extraction snapshots

use crate::triple::TripleSet;
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable, content-independent document identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the extraction pipeline hands over for one document
///
/// An empty triple set means the document was removed from the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Document identity
    pub document_id: DocumentId,
    /// Complete, deterministic triple set for the current content
    pub triples: TripleSet,
    /// Entity IRIs the document references
    #[serde(default)]
    pub entities: BTreeSet<String>,
}

impl DocumentSnapshot {
    /// Snapshot with triples and explicit entity references
    pub fn new(document_id: impl Into<DocumentId>, triples: TripleSet, entities: BTreeSet<String>) -> Self {
        Self {
            document_id: document_id.into(),
            triples,
            entities,
        }
    }

    /// Snapshot of a document that no longer exists
    pub fn removed(document_id: impl Into<DocumentId>, graph_uri: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            triples: TripleSet::new(graph_uri),
            entities: BTreeSet::new(),
        }
    }

    /// Whether this snapshot retracts the document
    pub fn is_removal(&self) -> bool {
        self.triples.is_empty()
    }

    /// Declared entity references plus every entity IRI appearing in the triples
    pub fn referenced_entities(&self, vocabulary: &Vocabulary) -> BTreeSet<String> {
        let mut entities = self.entities.clone();
        for triple in &self.triples {
            for term in [&triple.subject, &triple.object] {
                if vocabulary.is_entity(term) {
                    if let Some(iri) = term.as_iri() {
                        entities.insert(iri.to_string());
                    }
                }
            }
        }
        entities
    }
}
