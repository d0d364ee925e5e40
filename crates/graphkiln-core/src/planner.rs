//! Sync planning
//!
//! The planner computes the minimal delete/insert delta between what was last
//! published for a document and its current triple set.
//!
//! ## Shared-fact protection
//!
//! A triple whose subject is an entity IRI may be asserted by several
//! documents. Before such a triple is deleted, the planner asks a
//! [`ReferenceCounter`] how many *other* documents still reference the entity
//! and keeps the triple if any do. When the active backend cannot answer,
//! every entity-subject delete is withheld and the plan carries a
//! [`ConsistencyRisk`].

use crate::document::{DocumentId, DocumentSnapshot};
use crate::error::{PlanError, PlanResult};
use crate::record::SyncRecord;
use crate::storage::{StoreError, StoreResult};
use crate::triple::Triple;
use crate::vocabulary::Vocabulary;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers the shared-reference question for the planner
#[async_trait]
pub trait ReferenceCounter: Send + Sync {
    /// Number of documents other than `excluding` currently referencing `entity`
    ///
    /// [`StoreError::Unsupported`] means the backend cannot tell.
    async fn count_other_references(&self, entity: &str, excluding: &DocumentId) -> StoreResult<usize>;
}

/// What kind of change a plan represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// First publish of the document
    Insert,
    /// Content changed since the last publish
    Update,
    /// The document was removed
    Tombstone,
    /// Nothing to send
    Noop,
}

/// Deletes withheld because the active backend cannot count references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyRisk {
    pub document_id: DocumentId,
    /// Entity subjects whose triples were kept
    pub entities: BTreeSet<String>,
    pub reason: String,
}

impl fmt::Display for ConsistencyRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "document {}: kept triples of {} entit{} ({})",
            self.document_id,
            self.entities.len(),
            if self.entities.len() == 1 { "y" } else { "ies" },
            self.reason
        )
    }
}

/// Delta for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub document_id: DocumentId,
    /// Named graph the delta applies to
    pub graph_uri: String,
    pub to_delete: BTreeSet<Triple>,
    pub to_insert: BTreeSet<Triple>,
    /// Delete candidates kept because the fact is shared
    pub protected: BTreeSet<Triple>,
    pub consistency_risk: Option<ConsistencyRisk>,
    pub kind: PlanKind,
}

impl SyncPlan {
    /// Triple operations this plan sends
    pub fn operation_count(&self) -> usize {
        self.to_delete.len() + self.to_insert.len()
    }

    /// Whether the plan needs no network call
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Raw set difference: `(prior − new, new − prior)`
pub fn diff(prior: &BTreeSet<Triple>, new: &BTreeSet<Triple>) -> (BTreeSet<Triple>, BTreeSet<Triple>) {
    (
        prior.difference(new).cloned().collect(),
        new.difference(prior).cloned().collect(),
    )
}

/// Computes [`SyncPlan`]s
#[derive(Debug, Clone)]
pub struct SyncPlanner {
    vocabulary: Arc<Vocabulary>,
}

impl SyncPlanner {
    /// Create a planner
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Plan the sync of one snapshot against its prior record
    pub async fn plan(
        &self,
        snapshot: &DocumentSnapshot,
        prior: Option<&SyncRecord>,
        references: &dyn ReferenceCounter,
    ) -> PlanResult<SyncPlan> {
        snapshot.triples.validate()?;

        let removal = snapshot.is_removal();
        let live_prior = prior.filter(|record| !record.is_tombstone());

        if let Some(record) = live_prior {
            if !removal && record.graph_uri != snapshot.triples.graph_uri {
                return Err(PlanError::GraphMismatch {
                    document_id: snapshot.document_id.to_string(),
                    recorded: record.graph_uri.clone(),
                    requested: snapshot.triples.graph_uri.clone(),
                });
            }
        }

        let graph_uri = match (removal, live_prior) {
            (true, Some(record)) => record.graph_uri.clone(),
            _ => snapshot.triples.graph_uri.clone(),
        };

        let mut plan = SyncPlan {
            document_id: snapshot.document_id.clone(),
            graph_uri,
            to_delete: BTreeSet::new(),
            to_insert: BTreeSet::new(),
            protected: BTreeSet::new(),
            consistency_risk: None,
            kind: PlanKind::Noop,
        };

        let Some(record) = live_prior else {
            if !removal {
                plan.to_insert = snapshot.triples.triples.clone();
                plan.kind = PlanKind::Insert;
            }
            return Ok(plan);
        };

        let (to_delete, mut to_insert) = diff(&record.triples, &snapshot.triples.triples);
        if record.interrupted {
            // the delete phase may have run; re-insert everything that should exist
            to_insert = snapshot.triples.triples.clone();
        }
        plan.to_insert = to_insert;
        plan.to_delete = to_delete;
        self.protect_shared(&mut plan, references).await?;

        plan.kind = if removal {
            PlanKind::Tombstone
        } else if plan.is_empty() {
            PlanKind::Noop
        } else {
            PlanKind::Update
        };

        debug!(
            document_id = %plan.document_id,
            kind = ?plan.kind,
            deletes = plan.to_delete.len(),
            inserts = plan.to_insert.len(),
            protected = plan.protected.len(),
            "Planned sync"
        );
        Ok(plan)
    }

    async fn protect_shared(
        &self,
        plan: &mut SyncPlan,
        references: &dyn ReferenceCounter,
    ) -> PlanResult<()> {
        let mut shared: HashMap<String, bool> = HashMap::new();
        let mut unsupported: Option<String> = None;

        let entity_subjects: BTreeSet<String> = plan
            .to_delete
            .iter()
            .filter(|triple| self.vocabulary.is_entity(&triple.subject))
            .filter_map(|triple| triple.subject.as_iri().map(str::to_string))
            .collect();

        for entity in &entity_subjects {
            if unsupported.is_some() {
                break;
            }
            match references
                .count_other_references(entity, &plan.document_id)
                .await
            {
                Ok(count) => {
                    shared.insert(entity.clone(), count > 0);
                }
                Err(StoreError::Unsupported(reason)) => unsupported = Some(reason),
                Err(err) => return Err(err.into()),
            }
        }

        let keep = |triple: &Triple| match triple.subject.as_iri() {
            Some(iri) if entity_subjects.contains(iri) => {
                unsupported.is_some() || shared.get(iri).copied().unwrap_or(false)
            }
            _ => false,
        };
        let (protected, to_delete): (BTreeSet<Triple>, BTreeSet<Triple>) =
            std::mem::take(&mut plan.to_delete).into_iter().partition(|t| keep(t));
        plan.to_delete = to_delete;
        plan.protected = protected;

        if let Some(reason) = unsupported {
            let risk = ConsistencyRisk {
                document_id: plan.document_id.clone(),
                entities: entity_subjects,
                reason: format!("reference counting unsupported: {reason}"),
            };
            warn!(
                document_id = %risk.document_id,
                entities = risk.entities.len(),
                "Shared-fact check unavailable, keeping all entity triples"
            );
            plan.consistency_risk = Some(risk);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triple::{Term, TripleSet, RDF_TYPE};
    use graphkiln_config::VocabularyConfig;
    use proptest::prelude::*;

    const GRAPH: &str = "urn:g";

    struct FixedCounts(HashMap<String, usize>);

    #[async_trait]
    impl ReferenceCounter for FixedCounts {
        async fn count_other_references(&self, entity: &str, _excluding: &DocumentId) -> StoreResult<usize> {
            Ok(self.0.get(entity).copied().unwrap_or(0))
        }
    }

    struct CannotCount;

    #[async_trait]
    impl ReferenceCounter for CannotCount {
        async fn count_other_references(&self, _entity: &str, _excluding: &DocumentId) -> StoreResult<usize> {
            Err(StoreError::unsupported("field filters"))
        }
    }

    fn planner() -> SyncPlanner {
        SyncPlanner::new(Arc::new(Vocabulary::from_config(&VocabularyConfig::default())))
    }

    fn entity() -> String {
        "https://graphkiln.dev/entity/person/ada-lovelace".to_string()
    }

    fn title(value: &str) -> Triple {
        Triple::new(Term::iri("urn:doc:d1"), Term::iri("urn:p:title"), Term::literal(value))
    }

    fn entity_type() -> Triple {
        Triple::new(Term::iri(entity()), Term::iri(RDF_TYPE), Term::iri("https://schema.org/Person"))
    }

    fn snapshot(triples: impl IntoIterator<Item = Triple>) -> DocumentSnapshot {
        DocumentSnapshot::new("d1", TripleSet::from_triples(GRAPH, triples), BTreeSet::new())
    }

    fn record(triples: impl IntoIterator<Item = Triple>) -> SyncRecord {
        SyncRecord::published(DocumentId::from("d1"), &TripleSet::from_triples(GRAPH, triples), 1)
    }

    fn no_refs() -> FixedCounts {
        FixedCounts(HashMap::new())
    }

    #[tokio::test]
    async fn test_first_sync_inserts_everything() {
        let plan = planner()
            .plan(&snapshot([title("X")]), None, &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Insert);
        assert_eq!(plan.to_insert, BTreeSet::from([title("X")]));
        assert!(plan.to_delete.is_empty());
    }

    #[tokio::test]
    async fn test_changed_title_replaces_triple() {
        let prior = record([title("X")]);
        let plan = planner()
            .plan(&snapshot([title("Y")]), Some(&prior), &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Update);
        assert_eq!(plan.to_delete, BTreeSet::from([title("X")]));
        assert_eq!(plan.to_insert, BTreeSet::from([title("Y")]));
    }

    #[tokio::test]
    async fn test_unchanged_content_is_noop() {
        let prior = record([title("X"), entity_type()]);
        let plan = planner()
            .plan(&snapshot([title("X"), entity_type()]), Some(&prior), &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Noop);
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_tombstone_keeps_shared_entity() {
        let prior = record([title("X"), entity_type()]);
        let counts = FixedCounts(HashMap::from([(entity(), 1)]));
        let plan = planner()
            .plan(&DocumentSnapshot::removed("d1", GRAPH), Some(&prior), &counts)
            .await
            .unwrap();

        assert_eq!(plan.kind, PlanKind::Tombstone);
        assert_eq!(plan.to_delete, BTreeSet::from([title("X")]));
        assert_eq!(plan.protected, BTreeSet::from([entity_type()]));
        assert!(plan.to_insert.is_empty());
        assert!(plan.consistency_risk.is_none());
    }

    #[tokio::test]
    async fn test_unreferenced_entity_is_deleted() {
        let prior = record([title("X"), entity_type()]);
        let plan = planner()
            .plan(&DocumentSnapshot::removed("d1", GRAPH), Some(&prior), &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.to_delete, BTreeSet::from([title("X"), entity_type()]));
        assert!(plan.protected.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_counting_falls_back_to_keeping() {
        let prior = record([title("X"), entity_type()]);
        let plan = planner()
            .plan(&DocumentSnapshot::removed("d1", GRAPH), Some(&prior), &CannotCount)
            .await
            .unwrap();

        assert_eq!(plan.to_delete, BTreeSet::from([title("X")]));
        assert_eq!(plan.protected, BTreeSet::from([entity_type()]));
        let risk = plan.consistency_risk.unwrap();
        assert_eq!(risk.entities, BTreeSet::from([entity()]));
    }

    #[tokio::test]
    async fn test_removal_without_record_is_noop() {
        let plan = planner()
            .plan(&DocumentSnapshot::removed("d1", GRAPH), None, &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Noop);

        let tombstone = SyncRecord::tombstone(DocumentId::from("d1"), GRAPH, 1);
        let plan = planner()
            .plan(&DocumentSnapshot::removed("d1", GRAPH), Some(&tombstone), &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Noop);
    }

    #[tokio::test]
    async fn test_interrupted_record_reinserts_everything() {
        let prior = record([title("X")]).into_interrupted();
        let plan = planner()
            .plan(&snapshot([title("X")]), Some(&prior), &no_refs())
            .await
            .unwrap();
        assert_eq!(plan.kind, PlanKind::Update);
        assert_eq!(plan.to_insert, BTreeSet::from([title("X")]));
        assert!(plan.to_delete.is_empty());
    }

    #[tokio::test]
    async fn test_graph_move_is_rejected() {
        let prior = record([title("X")]);
        let moved = DocumentSnapshot::new(
            "d1",
            TripleSet::from_triples("urn:other", [title("X")]),
            BTreeSet::new(),
        );
        let err = planner().plan(&moved, Some(&prior), &no_refs()).await.unwrap_err();
        assert!(matches!(err, PlanError::GraphMismatch { .. }));
    }

    #[tokio::test]
    async fn test_blank_nodes_rejected() {
        let blank = Triple::new(Term::blank("b0"), Term::iri("urn:p"), Term::literal("x"));
        let err = planner().plan(&snapshot([blank]), None, &no_refs()).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidTriple(_)));
    }

    fn arb_triple() -> impl Strategy<Value = Triple> {
        (0..3usize, 0..3usize, 0..4usize).prop_map(|(s, p, o)| {
            let subject = if s == 0 {
                entity()
            } else {
                format!("urn:doc:d1#s{s}")
            };
            Triple::new(
                Term::iri(subject),
                Term::iri(format!("urn:p:{p}")),
                Term::literal(format!("v{o}")),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_delta_is_exact_set_difference(
            prior in prop::collection::btree_set(arb_triple(), 0..12),
            new in prop::collection::btree_set(arb_triple(), 0..12),
            shared in any::<bool>(),
        ) {
            let counts = FixedCounts(HashMap::from([(entity(), usize::from(shared))]));
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let prior_record = record(prior.clone());
            let plan = runtime
                .block_on(planner().plan(&snapshot(new.clone()), Some(&prior_record), &counts))
                .unwrap();

            let expected_delete: BTreeSet<Triple> = prior.difference(&new).cloned().collect();
            let expected_insert: BTreeSet<Triple> = new.difference(&prior).cloned().collect();

            prop_assert_eq!(&plan.to_insert, &expected_insert);
            let mut recombined = plan.to_delete.clone();
            recombined.extend(plan.protected.iter().cloned());
            prop_assert_eq!(&recombined, &expected_delete);
            if shared {
                prop_assert!(plan.to_delete.iter().all(|t| t.subject.as_iri() != Some(entity().as_str())));
            } else {
                prop_assert!(plan.protected.is_empty());
            }
        }
    }
}
