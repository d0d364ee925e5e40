//! End-to-end sync runs against the in-process triple store

use graphkiln_config::GraphkilnConfig;
use graphkiln_core::triple::RDF_TYPE;
use graphkiln_core::{
    Capabilities, ConfigurationError, DocumentId, DocumentSnapshot, MemoryMetadataStore,
    MetadataStore, SyncStatus, Term, Triple, TripleSet, Vocabulary,
};
use graphkiln_sparql::update::delete_data;
use graphkiln_sparql::{MemoryTripleStore, SparqlEndpoint};
use graphkiln_sync::{default_registry, CancellationToken, SyncEngine, SyncError, SyncSummary};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config() -> GraphkilnConfig {
    let mut config = GraphkilnConfig::default();
    config.backend.type_key = "memory".to_string();
    config.sync.max_retries = 3;
    config.sync.base_backoff_ms = 1;
    config.sync.max_backoff_ms = 5;
    config.sync.workers = 4;
    config.sync.batch_size = 100;
    config
}

fn graph() -> String {
    GraphkilnConfig::default().graph.graph_uri
}

struct Harness {
    engine: SyncEngine,
    remote: Arc<MemoryTripleStore>,
    vocabulary: Arc<Vocabulary>,
}

impl Harness {
    fn new() -> Self {
        Self::with(Arc::new(MemoryMetadataStore::new()), MemoryTripleStore::new(), config())
    }

    fn with(store: Arc<dyn MetadataStore>, remote: MemoryTripleStore, config: GraphkilnConfig) -> Self {
        let remote = Arc::new(remote);
        let vocabulary = Arc::new(Vocabulary::from_config(&config.vocabulary));
        let engine = SyncEngine::new(store, remote.clone(), vocabulary.clone(), &config);
        Self {
            engine,
            remote,
            vocabulary,
        }
    }

    async fn run(&self, snapshots: Vec<DocumentSnapshot>) -> SyncSummary {
        self.engine
            .run(snapshots, &CancellationToken::new())
            .await
            .unwrap()
    }

    fn entity(&self, kind: &str, name: &str) -> Term {
        self.vocabulary.resolver().resolve(kind, name).to_term()
    }

    fn graph(&self) -> TripleSet {
        self.remote.graph(&graph())
    }

    async fn status(&self, document_id: &str, triples: &TripleSet) -> SyncStatus {
        self.engine
            .records()
            .status_of(&DocumentId::from(document_id), Some(&triples.set_hash()))
            .await
            .unwrap()
    }
}

fn triple(subject: &Term, predicate: &str, object: Term) -> Triple {
    Triple::new(subject.clone(), Term::iri(predicate), object)
}

fn doc(id: &str) -> Term {
    Term::iri(format!("urn:doc:{id}"))
}

fn title(id: &str, value: &str) -> Triple {
    triple(&doc(id), "http://purl.org/dc/terms/title", Term::literal(value))
}

fn set(triples: impl IntoIterator<Item = Triple>) -> TripleSet {
    TripleSet::from_triples(graph(), triples)
}

fn snapshot(id: &str, triples: impl IntoIterator<Item = Triple>) -> DocumentSnapshot {
    DocumentSnapshot::new(id, set(triples), BTreeSet::new())
}

#[tokio::test]
async fn test_first_sync_publishes_and_records() {
    let h = Harness::new();
    let summary = h.run(vec![snapshot("d1", [title("d1", "X")])]).await;

    assert_eq!(summary.synced, 1);
    assert_eq!(h.graph(), set([title("d1", "X")]));

    let record = h.engine.records().load(&DocumentId::from("d1")).await.unwrap().unwrap();
    assert_eq!(record.set_hash, set([title("d1", "X")]).set_hash());
    assert_eq!(h.status("d1", &set([title("d1", "X")])).await, SyncStatus::Synced);
}

#[tokio::test]
async fn test_changed_title_replaces_triple_in_one_update() {
    let h = Harness::new();
    h.run(vec![snapshot("d1", [title("d1", "X")])]).await;
    h.run(vec![snapshot("d1", [title("d1", "Y")])]).await;

    assert_eq!(h.graph(), set([title("d1", "Y")]));
    let requests = h.remote.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].contains(&title("d1", "X").to_ntriples()));
    assert!(requests[1].contains("DELETE DATA"));
    assert!(requests[1].contains(&title("d1", "Y").to_ntriples()));
}

#[tokio::test]
async fn test_unchanged_content_sends_nothing() {
    let h = Harness::new();
    let corpus = || {
        vec![
            snapshot("d1", [title("d1", "X")]),
            snapshot("d2", [title("d2", "Y")]),
        ]
    };
    h.run(corpus()).await;
    let calls = h.remote.update_calls();

    let summary = h.run(corpus()).await;
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.synced, 0);
    assert_eq!(h.remote.update_calls(), calls);
}

#[tokio::test]
async fn test_removing_document_keeps_shared_entity() {
    let h = Harness::new();
    let ada = h.entity("person", "Ada Lovelace");
    let person = Term::iri("https://schema.org/Person");
    let mentions = "https://schema.org/mentions";

    h.run(vec![
        snapshot(
            "d1",
            [
                title("d1", "Notes"),
                triple(&doc("d1"), mentions, ada.clone()),
                triple(&ada, RDF_TYPE, person.clone()),
            ],
        ),
        snapshot("d2", [triple(&doc("d2"), mentions, ada.clone())]),
    ])
    .await;

    let summary = h
        .run(vec![DocumentSnapshot::removed("d1", graph())])
        .await;
    assert_eq!(summary.tombstoned, 1);
    assert!(summary.consistency_risks.is_empty());
    assert_eq!(
        h.graph(),
        set([
            triple(&ada, RDF_TYPE, person.clone()),
            triple(&doc("d2"), mentions, ada.clone()),
        ])
    );

    let tombstone = h.engine.records().load(&DocumentId::from("d1")).await.unwrap().unwrap();
    assert!(tombstone.is_tombstone());

    // a repeated removal is a no-op
    let calls = h.remote.update_calls();
    let summary = h.run(vec![DocumentSnapshot::removed("d1", graph())]).await;
    assert_eq!(summary.unchanged, 1);
    assert_eq!(h.remote.update_calls(), calls);
}

#[tokio::test]
async fn test_unshared_entity_is_retracted_with_its_document() {
    let h = Harness::new();
    let place = h.entity("place", "Zürich");
    h.run(vec![snapshot(
        "d1",
        [triple(&place, RDF_TYPE, Term::iri("https://schema.org/Place"))],
    )])
    .await;

    h.run(vec![DocumentSnapshot::removed("d1", graph())]).await;
    assert!(h.graph().is_empty());
}

fn one_worker(batch_size: usize) -> GraphkilnConfig {
    let mut config = config();
    config.sync.workers = 1;
    config.sync.batch_size = batch_size;
    config
}

#[tokio::test]
async fn test_entity_asserted_by_a_new_document_survives_removal_in_same_run() {
    let h = Harness::with(Arc::new(MemoryMetadataStore::new()), MemoryTripleStore::new(), one_worker(3));
    let ada = h.entity("person", "Ada Lovelace");
    let entity_type = triple(&ada, RDF_TYPE, Term::iri("https://schema.org/Person"));
    h.run(vec![snapshot("b", [entity_type.clone(), title("b", "X"), title("b", "X2")])])
        .await;

    // "a" sorts first, so its insert goes out before b's retraction
    let summary = h
        .run(vec![
            DocumentSnapshot::removed("b", graph()),
            snapshot("a", [entity_type.clone(), title("a", "Z")]),
        ])
        .await;
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.tombstoned, 1);
    assert_eq!(h.graph(), set([entity_type.clone(), title("a", "Z")]));

    h.run(vec![DocumentSnapshot::removed("a", graph())]).await;
    assert!(h.graph().is_empty());
}

#[tokio::test]
async fn test_entity_mentioned_by_a_new_document_survives_removal_in_same_run() {
    let h = Harness::with(Arc::new(MemoryMetadataStore::new()), MemoryTripleStore::new(), one_worker(3));
    let ada = h.entity("person", "Ada Lovelace");
    let entity_type = triple(&ada, RDF_TYPE, Term::iri("https://schema.org/Person"));
    let mention = triple(&doc("a"), "https://schema.org/mentions", ada.clone());
    h.run(vec![snapshot("b", [entity_type.clone(), title("b", "X"), title("b", "X2")])])
        .await;

    h.run(vec![
        DocumentSnapshot::removed("b", graph()),
        snapshot("a", [mention.clone(), title("a", "Z")]),
    ])
    .await;
    assert_eq!(h.graph(), set([entity_type, mention, title("a", "Z")]));
}

#[tokio::test]
async fn test_without_reference_counting_entities_are_never_deleted() {
    let h = Harness::with(
        Arc::new(MemoryMetadataStore::with_capabilities(Capabilities::empty())),
        MemoryTripleStore::new(),
        config(),
    );
    let ada = h.entity("person", "Ada Lovelace");
    let entity_type = triple(&ada, RDF_TYPE, Term::iri("https://schema.org/Person"));
    h.run(vec![snapshot("d1", [title("d1", "X"), entity_type.clone()])]).await;

    let summary = h.run(vec![DocumentSnapshot::removed("d1", graph())]).await;
    assert_eq!(summary.tombstoned, 1);
    assert_eq!(summary.consistency_risks.len(), 1);
    assert_eq!(h.graph(), set([entity_type]));
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let h = Harness::new();
    h.remote.fail_next_with_status(3, 503);

    let summary = h.run(vec![snapshot("d1", [title("d1", "X")])]).await;
    assert_eq!(summary.synced, 1);
    assert!(summary.is_success());
    assert_eq!(h.remote.update_calls(), 4);
    assert_eq!(h.status("d1", &set([title("d1", "X")])).await, SyncStatus::Synced);
}

#[tokio::test]
async fn test_exhausted_retries_leave_document_unsynced() {
    let h = Harness::new();
    h.remote.fail_next_connection(10);

    let summary = h.run(vec![snapshot("d1", [title("d1", "X")])]).await;
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].kind, "transient_transport");
    assert_eq!(h.remote.update_calls(), 4);
    assert_eq!(h.status("d1", &set([title("d1", "X")])).await, SyncStatus::Unsynced);
}

#[tokio::test]
async fn test_permanent_failure_is_isolated_to_its_document() {
    let h = Harness::new();
    h.remote.fail_matching("\"poison\"", 2, 400);

    let summary = h
        .run(vec![
            snapshot("d1", [title("d1", "poison")]),
            snapshot("d2", [title("d2", "fine")]),
        ])
        .await;

    assert_eq!(summary.synced, 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].document_id, DocumentId::from("d1"));
    assert_eq!(summary.failures[0].kind, "permanent_transport");
    assert_eq!(h.graph(), set([title("d2", "fine")]));
}

#[tokio::test]
async fn test_unknown_backend_fails_before_any_sync() {
    let mut config = config();
    config.backend.type_key = "unknown-store".to_string();

    let err = SyncEngine::from_config(&config, default_registry().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Configuration(ConfigurationError::UnknownBackend { ref type_key, .. })
            if type_key == "unknown-store"
    ));
}

#[tokio::test]
async fn test_round_trip_through_the_store() {
    let h = Harness::new();
    let ada = h.entity("person", "Ada Lovelace");
    let original = set([
        title("d1", "say \"hi\"\n\tand leave\\"),
        triple(&doc("d1"), "urn:p:label", Term::lang_literal("Zürich", "de")),
        triple(
            &doc("d1"),
            "urn:p:count",
            Term::typed_literal("3", "http://www.w3.org/2001/XMLSchema#integer"),
        ),
        triple(&doc("d1"), "https://schema.org/mentions", ada),
    ]);
    h.run(vec![DocumentSnapshot::new("d1", original.clone(), BTreeSet::new())])
        .await;

    let read_back = h.engine.endpoint().fetch_graph(&graph()).await.unwrap();
    assert_eq!(read_back, original);

    let reports = h
        .engine
        .verify(&[DocumentSnapshot::new("d1", original, BTreeSet::new())])
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_clean());
}

#[tokio::test]
async fn test_concurrent_runs_for_one_document_do_not_interleave() {
    let h = Harness::with(
        Arc::new(MemoryMetadataStore::new()),
        MemoryTripleStore::new().with_update_delay(Duration::from_millis(30)),
        config(),
    );
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        h.engine.run(vec![snapshot("d1", [title("d1", "X")])], &cancel),
        h.engine.run(vec![snapshot("d1", [title("d1", "Y")])], &cancel),
    );
    assert!(a.unwrap().is_success());
    assert!(b.unwrap().is_success());

    assert_eq!(h.remote.max_in_flight(), 1);
    let record = h.engine.records().load(&DocumentId::from("d1")).await.unwrap().unwrap();
    assert_eq!(h.graph(), record.triple_set());
    assert_eq!(h.graph().len(), 1);
}

#[tokio::test]
async fn test_reconcile_retracts_missing_documents() {
    let h = Harness::new();
    h.run(vec![
        snapshot("d1", [title("d1", "X")]),
        snapshot("d2", [title("d2", "Y")]),
    ])
    .await;

    let summary = h
        .engine
        .reconcile_corpus(vec![snapshot("d2", [title("d2", "Y")])], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.tombstoned, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(h.graph(), set([title("d2", "Y")]));
    assert_eq!(
        h.engine.records().status_of(&DocumentId::from("d1"), None).await.unwrap(),
        SyncStatus::Tombstoned
    );
}

#[tokio::test]
async fn test_cancelled_run_skips_everything() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = h
        .engine
        .run(
            vec![snapshot("d1", [title("d1", "X")]), snapshot("d2", [title("d2", "Y")])],
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(h.remote.update_calls(), 0);
    assert_eq!(h.status("d1", &set([title("d1", "X")])).await, SyncStatus::Unsynced);
}

#[tokio::test]
async fn test_cancel_stops_remaining_batches_of_a_running_chunk() {
    let h = Harness::with(
        Arc::new(MemoryMetadataStore::new()),
        MemoryTripleStore::new().with_update_delay(Duration::from_millis(20)),
        one_worker(2),
    );
    let r1 = [title("r1", "A"), title("r1", "B"), title("r1", "C")];
    let r2 = [title("r2", "A"), title("r2", "B"), title("r2", "C")];
    h.run(vec![snapshot("r1", r1.clone()), snapshot("r2", r2.clone())]).await;
    let before = h.remote.update_calls();

    // both removals fit one chunk but need a batch each
    let cancel = CancellationToken::new();
    let watcher = {
        let remote = h.remote.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while remote.update_calls() <= before {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            cancel.cancel();
        })
    };
    let summary = h
        .engine
        .run(
            vec![DocumentSnapshot::removed("r1", graph()), DocumentSnapshot::removed("r2", graph())],
            &cancel,
        )
        .await
        .unwrap();
    watcher.await.unwrap();

    assert_eq!(summary.tombstoned, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(h.remote.update_calls(), before + 1);
    assert_eq!(h.graph(), set(r2.clone()));
    assert_eq!(h.status("r2", &set(r2)).await, SyncStatus::Synced);
}

#[tokio::test]
async fn test_two_phase_upsert_recovers_after_failed_insert() {
    let mut two_phase = config();
    two_phase.endpoint.atomic_updates = false;
    let h = Harness::with(Arc::new(MemoryMetadataStore::new()), MemoryTripleStore::new(), two_phase);

    let a = title("d1", "A");
    let b = title("d1", "B");
    let c = title("d1", "C");
    h.run(vec![snapshot("d1", [a.clone(), b.clone()])]).await;

    // the delete phase of {A, B} -> {A, C} lands, the insert phase does not
    h.remote.fail_matching("INSERT DATA", 1, 400);
    let summary = h.run(vec![snapshot("d1", [a.clone(), c.clone()])]).await;
    assert_eq!(summary.failed(), 1);
    assert_eq!(h.graph(), set([a.clone()]));
    let record = h.engine.records().load(&DocumentId::from("d1")).await.unwrap().unwrap();
    assert!(record.interrupted);

    // A also drifts out of the store before the retry
    h.remote
        .update(&delete_data(&graph(), [&a]).unwrap())
        .await
        .unwrap();
    let summary = h.run(vec![snapshot("d1", [a.clone(), b.clone()])]).await;
    assert_eq!(summary.synced, 1);
    assert_eq!(h.graph(), set([a, b]));
    let record = h.engine.records().load(&DocumentId::from("d1")).await.unwrap().unwrap();
    assert!(!record.interrupted);
}

#[tokio::test]
async fn test_sqlite_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.backend.type_key = "sqlite".to_string();
    config.backend.settings.insert(
        "path".to_string(),
        toml::Value::String(dir.path().join("records.db").display().to_string()),
    );
    let vocabulary = Arc::new(Vocabulary::from_config(&config.vocabulary));
    let remote = Arc::new(MemoryTripleStore::new());

    let ada = vocabulary.resolver().resolve("person", "Ada Lovelace").to_term();
    let person = triple(&ada, RDF_TYPE, Term::iri("https://schema.org/Person"));
    let corpus = || {
        vec![
            snapshot("d1", [title("d1", "X"), person.clone()]),
            snapshot("d2", [triple(&doc("d2"), "https://schema.org/mentions", ada.clone())]),
        ]
    };

    let engine = open_sqlite(&config, &vocabulary, &remote).await;
    let summary = engine.run(corpus(), &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.synced, 2);
    engine.close().await.unwrap();
    let calls = remote.update_calls();

    let engine = open_sqlite(&config, &vocabulary, &remote).await;
    let summary = engine.run(corpus(), &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.unchanged, 2);
    assert_eq!(remote.update_calls(), calls);

    let summary = engine
        .run(vec![DocumentSnapshot::removed("d1", graph())], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.tombstoned, 1);
    assert!(remote.contains(&graph(), &person));
    assert!(!remote.contains(&graph(), &title("d1", "X")));
}

async fn open_sqlite(
    config: &GraphkilnConfig,
    vocabulary: &Arc<Vocabulary>,
    remote: &Arc<MemoryTripleStore>,
) -> SyncEngine {
    let store = default_registry()
        .unwrap()
        .instantiate(config, vocabulary.clone())
        .await
        .unwrap();
    SyncEngine::new(store, remote.clone(), vocabulary.clone(), config)
}
