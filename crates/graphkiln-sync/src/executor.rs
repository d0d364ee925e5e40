//! Upsert executor: batches of plans to SPARQL update requests
//!
//! With `atomic_updates` a batch is one request holding, for each graph, a
//! `DELETE DATA` block followed by an `INSERT DATA` block. Without it the deletes and inserts
//! go out as two requests, and each document with deletes is first flagged
//! interrupted through the [`UpsertJournal`] so a later run re-inserts its
//! whole set.

use crate::batch::Batch;
use crate::error::{SyncError, TransportError};
use crate::records::SyncRecordStore;
use crate::retry::RetryConfig;
use async_trait::async_trait;
use graphkiln_core::{DocumentId, StoreError, StoreResult, SyncPlan, Triple};
use graphkiln_sparql::update::{delete_data, insert_data, upsert};
use graphkiln_sparql::SparqlEndpoint;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Told about documents whose delete phase is about to run on its own
#[async_trait]
pub trait UpsertJournal: Send + Sync {
    async fn before_delete(&self, document_id: &DocumentId) -> StoreResult<()>;
}

#[async_trait]
impl UpsertJournal for SyncRecordStore {
    async fn before_delete(&self, document_id: &DocumentId) -> StoreResult<()> {
        self.mark_interrupted(document_id).await.map(|_| ())
    }
}

/// Outcome of one document of a batch
#[derive(Debug)]
pub struct Executed {
    pub plan: SyncPlan,
    pub result: Result<(), SyncError>,
}

#[derive(Debug, Clone)]
enum SendError {
    Transport(TransportError),
    Journal(StoreError),
}

impl SendError {
    fn is_permanent(&self) -> bool {
        matches!(self, SendError::Transport(err) if err.is_permanent())
    }
}

impl From<SendError> for SyncError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Transport(err) => SyncError::Transport(err),
            SendError::Journal(err) => SyncError::Store(err),
        }
    }
}

/// Sends batches to a [`SparqlEndpoint`] with retries
#[derive(Clone)]
pub struct UpsertExecutor {
    endpoint: Arc<dyn SparqlEndpoint>,
    retry: RetryConfig,
    atomic: bool,
}

impl std::fmt::Debug for UpsertExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertExecutor")
            .field("retry", &self.retry)
            .field("atomic", &self.atomic)
            .finish()
    }
}

type GraphTriples<'a> = BTreeMap<&'a str, Vec<&'a Triple>>;

fn by_graph<'a>(
    plans: &'a [SyncPlan],
    pick: impl Fn(&'a SyncPlan) -> &'a BTreeSet<Triple>,
) -> GraphTriples<'a> {
    let mut graphs: GraphTriples<'a> = BTreeMap::new();
    for plan in plans {
        let triples = pick(plan);
        if !triples.is_empty() {
            graphs
                .entry(plan.graph_uri.as_str())
                .or_default()
                .extend(triples.iter());
        }
    }
    graphs
}

fn invalid(err: graphkiln_sparql::SparqlError) -> SendError {
    SendError::Transport(TransportError::from_sparql(&err, 0))
}

fn render(
    graphs: &GraphTriples<'_>,
    build: fn(&str, Vec<&Triple>) -> graphkiln_sparql::SparqlResult<String>,
) -> Result<Vec<String>, SendError> {
    graphs
        .iter()
        .map(|(graph, triples)| build(graph, triples.clone()).map_err(invalid))
        .collect()
}

/// One delete/insert pair per graph touched by either side
fn render_upserts(
    deletes: &GraphTriples<'_>,
    inserts: &GraphTriples<'_>,
) -> Result<Vec<String>, SendError> {
    let graphs: BTreeSet<&str> = deletes.keys().chain(inserts.keys()).copied().collect();
    let none: Vec<&Triple> = Vec::new();
    let mut parts = Vec::with_capacity(graphs.len());
    for graph in graphs {
        let update = upsert(
            graph,
            deletes.get(graph).unwrap_or(&none).iter().copied(),
            inserts.get(graph).unwrap_or(&none).iter().copied(),
        )
        .map_err(invalid)?;
        parts.extend(update);
    }
    Ok(parts)
}

fn build_delete(graph: &str, triples: Vec<&Triple>) -> graphkiln_sparql::SparqlResult<String> {
    delete_data(graph, triples)
}

fn build_insert(graph: &str, triples: Vec<&Triple>) -> graphkiln_sparql::SparqlResult<String> {
    insert_data(graph, triples)
}

impl UpsertExecutor {
    pub fn new(endpoint: Arc<dyn SparqlEndpoint>, retry: RetryConfig, atomic: bool) -> Self {
        Self {
            endpoint,
            retry,
            atomic,
        }
    }

    /// Execute a batch, isolating documents if the batch fails permanently
    pub async fn execute(&self, batch: Batch, journal: &dyn UpsertJournal) -> Vec<Executed> {
        if batch.is_empty() {
            return Vec::new();
        }
        debug!(
            documents = batch.len(),
            operations = batch.operation_count(),
            atomic = self.atomic,
            "Executing batch"
        );

        match self.send(batch.plans(), journal).await {
            Ok(()) => Self::settle(batch, |_| Ok(())),
            Err(err) if err.is_permanent() && batch.len() > 1 => {
                let err = SyncError::from(err);
                warn!(
                    documents = batch.len(),
                    error = %err,
                    "Batch failed permanently, retrying its documents one by one"
                );
                let mut executed = Vec::with_capacity(batch.len());
                for single in batch.into_singles() {
                    let result = self.send(single.plans(), journal).await;
                    executed.extend(Self::settle(single, |_| result.clone().map_err(SyncError::from)));
                }
                executed
            }
            Err(err) => Self::settle(batch, |_| Err(SyncError::from(err.clone()))),
        }
    }

    fn settle(
        batch: Batch,
        result: impl Fn(&SyncPlan) -> Result<(), SyncError>,
    ) -> Vec<Executed> {
        batch
            .into_plans()
            .into_iter()
            .map(|plan| Executed {
                result: result(&plan),
                plan,
            })
            .collect()
    }

    async fn send(&self, plans: &[SyncPlan], journal: &dyn UpsertJournal) -> Result<(), SendError> {
        let deleted = by_graph(plans, |p| &p.to_delete);
        let inserted = by_graph(plans, |p| &p.to_insert);

        if self.atomic {
            let parts = render_upserts(&deleted, &inserted)?;
            return self.request("upsert", &parts).await;
        }

        let deletes = render(&deleted, build_delete)?;
        let inserts = render(&inserted, build_insert)?;

        if !deletes.is_empty() && !inserts.is_empty() {
            for plan in plans.iter().filter(|p| !p.to_delete.is_empty()) {
                journal
                    .before_delete(&plan.document_id)
                    .await
                    .map_err(SendError::Journal)?;
            }
        }
        self.request("delete", &deletes).await?;
        self.request("insert", &inserts).await
    }

    async fn request(&self, operation: &str, parts: &[String]) -> Result<(), SendError> {
        if parts.is_empty() {
            return Ok(());
        }
        let update = parts.join(" ;\n");
        self.retry
            .run(operation, || self.endpoint.update(&update))
            .await
            .map_err(SendError::Transport)
    }
}
