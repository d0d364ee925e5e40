//! Sync orchestration
//!
//! A run groups documents into chunks, and a bounded pool of workers takes
//! one chunk at a time: lease every document, plan, pack the plans into
//! batches, execute, update the records, release the leases.

use crate::batch::{pack, Batch};
use crate::claims::{RunClaims, RunReferences};
use crate::error::{SyncError, SyncResult};
use crate::executor::{Executed, UpsertExecutor};
use crate::lease::DocumentLeases;
use crate::records::{classify, SyncRecordStore};
use crate::retry::RetryConfig;
use crate::summary::{FailedDocument, SyncSummary};
use graphkiln_config::GraphkilnConfig;
use graphkiln_core::{
    BackendRegistry, ConfigurationError, DocumentId, DocumentSnapshot, MetadataStore, SyncEvent,
    SyncPlan, SyncPlanner, SyncRecord, SyncStatus, Triple, TripleSet, Vocabulary,
};
use graphkiln_sparql::{SparqlClient, SparqlEndpoint};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Differences between the snapshots and what a graph holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphReport {
    pub graph_uri: String,
    /// In the snapshots, absent from the store
    pub missing: BTreeSet<Triple>,
    /// In the store, in no snapshot
    pub unexpected: BTreeSet<Triple>,
}

impl GraphReport {
    /// Whether the graph matches exactly
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

struct Pending {
    snapshot: DocumentSnapshot,
    /// `Syncing` for publishes, `None` for removals
    status: Option<SyncStatus>,
}

enum Prepared {
    Unchanged,
    Planned(SyncPlan, Pending),
}

struct EngineInner {
    records: SyncRecordStore,
    planner: SyncPlanner,
    executor: UpsertExecutor,
    endpoint: Arc<dyn SparqlEndpoint>,
    leases: DocumentLeases,
    vocabulary: Arc<Vocabulary>,
    batch_size: usize,
    workers: usize,
}

/// Reconciles document snapshots against the remote store
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("records", &self.inner.records)
            .field("executor", &self.inner.executor)
            .field("batch_size", &self.inner.batch_size)
            .field("workers", &self.inner.workers)
            .finish()
    }
}

impl SyncEngine {
    /// Assemble an engine from an instantiated backend and endpoint
    pub fn new(
        store: Arc<dyn MetadataStore>,
        endpoint: Arc<dyn SparqlEndpoint>,
        vocabulary: Arc<Vocabulary>,
        config: &GraphkilnConfig,
    ) -> Self {
        let executor = UpsertExecutor::new(
            endpoint.clone(),
            RetryConfig::from_settings(&config.sync),
            config.endpoint.atomic_updates,
        );
        Self {
            inner: Arc::new(EngineInner {
                records: SyncRecordStore::new(store, config.backend.schema_version),
                planner: SyncPlanner::new(vocabulary.clone()),
                executor,
                endpoint,
                leases: DocumentLeases::new(),
                vocabulary,
                batch_size: config.sync.batch_size.max(1),
                workers: config.sync.workers.max(1),
            }),
        }
    }

    /// Validate configuration, instantiate the configured backend and connect
    ///
    /// Every configuration problem surfaces here, before any sync attempt.
    pub async fn from_config(config: &GraphkilnConfig, registry: BackendRegistry) -> SyncResult<Self> {
        config.validate().map_err(ConfigurationError::from)?;
        let vocabulary = Arc::new(Vocabulary::from_config(&config.vocabulary));
        let store = registry.instantiate(config, vocabulary.clone()).await?;
        let client = SparqlClient::from_config(&config.endpoint)?;
        Ok(Self::new(store, Arc::new(client), vocabulary, config))
    }

    /// Persisted sync state
    pub fn records(&self) -> &SyncRecordStore {
        &self.inner.records
    }

    /// Endpoint updates go to
    pub fn endpoint(&self) -> &Arc<dyn SparqlEndpoint> {
        &self.inner.endpoint
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.inner.vocabulary
    }

    /// Sync every snapshot; an empty triple set retracts the document
    pub async fn run(
        &self,
        snapshots: Vec<DocumentSnapshot>,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncSummary> {
        let snapshots = dedup(snapshots);
        let documents = snapshots.len();
        let claims = Arc::new(RunClaims::collect(&snapshots, &self.inner.vocabulary));
        let chunks = chunk(snapshots, self.inner.batch_size);
        info!(
            documents,
            chunks = chunks.len(),
            workers = self.inner.workers,
            backend = %self.inner.records.backend().descriptor().type_key,
            "Sync run started"
        );

        let semaphore = Arc::new(Semaphore::new(self.inner.workers));
        let mut tasks = JoinSet::new();
        let mut summary = SyncSummary::default();
        let mut pending = chunks.into_iter();

        while let Some(chunk) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let skipped = chunk.len() + pending.by_ref().map(|c| c.len()).sum::<usize>();
                warn!(skipped, "Sync run cancelled, leaving remaining documents for the next run");
                summary.skipped += skipped;
                break;
            };

            let inner = self.inner.clone();
            let claims = claims.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                inner.sync_chunk(chunk, &claims, &cancel).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(part) => summary.merge(part),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => warn!(error = %err, "Sync worker cancelled"),
            }
        }

        summary.sort();
        info!(
            synced = summary.synced,
            tombstoned = summary.tombstoned,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed(),
            "Sync run finished"
        );
        Ok(summary)
    }

    /// Like [`run`](Self::run), also retracting recorded documents absent from `snapshots`
    pub async fn reconcile_corpus(
        &self,
        mut snapshots: Vec<DocumentSnapshot>,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncSummary> {
        let present: BTreeSet<DocumentId> =
            snapshots.iter().map(|s| s.document_id.clone()).collect();

        let mut removed = 0usize;
        for record in self.inner.records.live_documents().await? {
            if !present.contains(&record.document_id) {
                snapshots.push(DocumentSnapshot::removed(record.document_id, record.graph_uri));
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Scheduling tombstones for documents missing from the corpus");
        }
        self.run(snapshots, cancel).await
    }

    /// Read back every graph the snapshots target and compare
    pub async fn verify(&self, snapshots: &[DocumentSnapshot]) -> SyncResult<Vec<GraphReport>> {
        let mut expected: BTreeMap<&str, BTreeSet<Triple>> = BTreeMap::new();
        for snapshot in snapshots {
            expected
                .entry(snapshot.triples.graph_uri.as_str())
                .or_default()
                .extend(snapshot.triples.iter().cloned());
        }

        let mut reports = Vec::with_capacity(expected.len());
        for (graph_uri, wanted) in expected {
            let actual: TripleSet = self.inner.endpoint.fetch_graph(graph_uri).await?;
            reports.push(GraphReport {
                graph_uri: graph_uri.to_string(),
                missing: wanted.difference(&actual.triples).cloned().collect(),
                unexpected: actual.triples.difference(&wanted).cloned().collect(),
            });
        }
        Ok(reports)
    }

    /// Close the metadata backend
    pub async fn close(&self) -> SyncResult<()> {
        self.inner.records.backend().close().await?;
        Ok(())
    }
}

impl EngineInner {
    async fn sync_chunk(
        &self,
        chunk: Vec<DocumentSnapshot>,
        claims: &RunClaims,
        cancel: &CancellationToken,
    ) -> SyncSummary {
        let _leases = self
            .leases
            .acquire_all(chunk.iter().map(|s| &s.document_id))
            .await;
        let mut summary = SyncSummary::default();
        let mut pending: HashMap<DocumentId, Pending> = HashMap::new();
        let mut plans = Vec::new();

        for snapshot in chunk {
            let document_id = snapshot.document_id.clone();
            match self.prepare(snapshot, claims).await {
                Ok(Prepared::Unchanged) => summary.unchanged += 1,
                Ok(Prepared::Planned(plan, context)) => {
                    if let Some(risk) = &plan.consistency_risk {
                        summary.consistency_risks.push(risk.clone());
                    }
                    pending.insert(document_id, context);
                    plans.push(plan);
                }
                Err(err) => fail(&mut summary, document_id, &err),
            }
        }

        // empty plans still need their record written
        let (quiet, loud): (Vec<SyncPlan>, Vec<SyncPlan>) =
            plans.into_iter().partition(SyncPlan::is_empty);
        let mut executed: Vec<Executed> = quiet
            .into_iter()
            .map(|plan| Executed { plan, result: Ok(()) })
            .collect();
        let mut batches = pack(loud, self.batch_size).into_iter();
        while let Some(batch) = batches.next() {
            if cancel.is_cancelled() {
                let unsent = std::iter::once(batch)
                    .chain(batches.by_ref())
                    .flat_map(Batch::into_plans);
                let mut skipped = 0;
                for plan in unsent {
                    pending.remove(&plan.document_id);
                    skipped += 1;
                }
                warn!(skipped, "Sync run cancelled, leaving unsent batches for the next run");
                summary.skipped += skipped;
                break;
            }
            executed.extend(self.executor.execute(batch, &self.records).await);
        }

        for Executed { plan, result } in executed {
            let Some(context) = pending.remove(&plan.document_id) else {
                continue;
            };
            let document_id = plan.document_id.clone();
            let outcome = match result {
                Ok(()) => self.finalize(&plan, context).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(SyncStatus::Tombstoned) => summary.tombstoned += 1,
                Ok(_) => summary.synced += 1,
                Err(err) => fail(&mut summary, document_id, &err),
            }
        }
        summary
    }

    async fn prepare(&self, snapshot: DocumentSnapshot, claims: &RunClaims) -> SyncResult<Prepared> {
        let document_id = &snapshot.document_id;
        let prior = self.records.load(document_id).await?;
        let current = classify(prior.as_ref(), Some(&snapshot.triples.set_hash()));

        let status = if snapshot.is_removal() {
            if matches!(current, SyncStatus::Unsynced | SyncStatus::Tombstoned) {
                debug!(document_id = %document_id, status = %current, "Nothing published to retract");
                return Ok(Prepared::Unchanged);
            }
            current.transition(SyncEvent::Removed)?;
            None
        } else {
            if current == SyncStatus::Synced {
                self.records
                    .replace_entity_refs(document_id, &snapshot.referenced_entities(&self.vocabulary))
                    .await?;
                return Ok(Prepared::Unchanged);
            }
            Some(current.transition(SyncEvent::Start)?)
        };

        let plan = self
            .planner
            .plan(&snapshot, prior.as_ref(), &RunReferences::new(&self.records, claims))
            .await?;
        Ok(Prepared::Planned(plan, Pending { snapshot, status }))
    }

    async fn finalize(&self, plan: &SyncPlan, context: Pending) -> SyncResult<SyncStatus> {
        let Pending { snapshot, status } = context;
        let document_id = snapshot.document_id.clone();
        let version = self.records.schema_version();

        match status {
            None => {
                self.records
                    .save(&SyncRecord::tombstone(document_id.clone(), &plan.graph_uri, version))
                    .await?;
                self.records
                    .replace_entity_refs(&document_id, &BTreeSet::new())
                    .await?;
                debug!(document_id = %document_id, deleted = plan.to_delete.len(), "Document tombstoned");
                Ok(SyncStatus::Tombstoned)
            }
            Some(status) => {
                let entities = snapshot.referenced_entities(&self.vocabulary);
                self.records
                    .save(&SyncRecord::published(document_id.clone(), &snapshot.triples, version))
                    .await?;
                self.records.replace_entity_refs(&document_id, &entities).await?;
                debug!(
                    document_id = %document_id,
                    deleted = plan.to_delete.len(),
                    inserted = plan.to_insert.len(),
                    "Document synced"
                );
                Ok(status.transition(SyncEvent::Succeeded)?)
            }
        }
    }
}

fn fail(summary: &mut SyncSummary, document_id: DocumentId, err: &SyncError) {
    error!(document_id = %document_id, kind = err.kind(), error = %err, "Document sync failed");
    summary.failures.push(FailedDocument {
        document_id,
        kind: err.kind(),
        message: err.to_string(),
    });
}

/// One snapshot per document, the last one given winning, in id order
fn dedup(snapshots: Vec<DocumentSnapshot>) -> Vec<DocumentSnapshot> {
    let mut by_id = BTreeMap::new();
    for snapshot in snapshots {
        if let Some(previous) = by_id.insert(snapshot.document_id.clone(), snapshot) {
            warn!(document_id = %previous.document_id, "Duplicate snapshot, keeping the later one");
        }
    }
    by_id.into_values().collect()
}

/// Group snapshots so each chunk's estimated operations stay near `limit`
fn chunk(snapshots: Vec<DocumentSnapshot>, limit: usize) -> Vec<Vec<DocumentSnapshot>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut weight = 0usize;

    for snapshot in snapshots {
        let estimate = snapshot.triples.len().max(1);
        if !current.is_empty() && weight + estimate > limit {
            chunks.push(std::mem::take(&mut current));
            weight = 0;
        }
        weight += estimate;
        current.push(snapshot);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
