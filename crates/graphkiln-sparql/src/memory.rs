//! In-process SPARQL endpoint
//!
//! Understands exactly the update text [`crate::update`] produces and
//! whole-graph `CONSTRUCT` queries. Requests are applied atomically: the full
//! request is parsed before any graph is touched. Failures can be injected
//! to drive retry and fallback paths.

use crate::client::SparqlEndpoint;
use crate::error::{SparqlError, SparqlResult};
use crate::ntriples::parse_line;
use async_trait::async_trait;
use graphkiln_core::{Triple, TripleSet};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Failure {
    Status(u16),
    Connection,
}

#[derive(Debug, Clone)]
struct Injected {
    failure: Failure,
    /// Only requests containing this text fail
    pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataOp {
    Delete,
    Insert,
}

/// Triple store living in the test process
#[derive(Debug, Default)]
pub struct MemoryTripleStore {
    graphs: RwLock<HashMap<String, BTreeSet<Triple>>>,
    failures: Mutex<VecDeque<Injected>>,
    requests: Mutex<Vec<String>>,
    update_delay: Option<Duration>,
    update_calls: AtomicUsize,
    applied_updates: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryTripleStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every update for `delay` before applying it
    pub fn with_update_delay(mut self, delay: Duration) -> Self {
        self.update_delay = Some(delay);
        self
    }

    fn inject(&self, count: usize, failure: Failure, pattern: Option<&str>) {
        let injected = Injected {
            failure,
            pattern: pattern.map(str::to_string),
        };
        self.failures
            .lock()
            .extend(std::iter::repeat(injected).take(count));
    }

    /// Fail the next `count` updates with an HTTP status
    pub fn fail_next_with_status(&self, count: usize, status: u16) {
        self.inject(count, Failure::Status(status), None);
    }

    /// Fail the next `count` updates as unreachable
    pub fn fail_next_connection(&self, count: usize) {
        self.inject(count, Failure::Connection, None);
    }

    /// Fail the next `count` updates whose body contains `pattern`
    pub fn fail_matching(&self, pattern: &str, count: usize, status: u16) {
        self.inject(count, Failure::Status(status), Some(pattern));
    }

    fn take_failure(&self, update: &str) -> Option<Failure> {
        let mut failures = self.failures.lock();
        let position = failures.iter().position(|injected| {
            injected
                .pattern
                .as_deref()
                .map_or(true, |pattern| update.contains(pattern))
        })?;
        failures.remove(position).map(|injected| injected.failure)
    }

    /// Update requests received, failed ones included
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Update requests that changed state
    pub fn applied_updates(&self) -> usize {
        self.applied_updates.load(Ordering::SeqCst)
    }

    /// Bodies of every applied update, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Highest number of updates seen in progress at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Current contents of a graph
    pub fn graph(&self, graph_uri: &str) -> TripleSet {
        let graphs = self.graphs.read();
        TripleSet::from_triples(
            graph_uri,
            graphs.get(graph_uri).into_iter().flatten().cloned(),
        )
    }

    /// Whether a graph holds a triple
    pub fn contains(&self, graph_uri: &str, triple: &Triple) -> bool {
        self.graphs
            .read()
            .get(graph_uri)
            .is_some_and(|triples| triples.contains(triple))
    }

    /// Write triples directly, bypassing the update path
    pub fn seed(&self, graph_uri: &str, triples: impl IntoIterator<Item = Triple>) {
        self.graphs
            .write()
            .entry(graph_uri.to_string())
            .or_default()
            .extend(triples);
    }

    fn apply(&self, update: &str) -> SparqlResult<()> {
        let operations = parse_update(update)?;
        let mut graphs = self.graphs.write();
        for (op, graph, triple) in operations {
            let triples = graphs.entry(graph).or_default();
            match op {
                DataOp::Delete => {
                    triples.remove(&triple);
                }
                DataOp::Insert => {
                    triples.insert(triple);
                }
            }
        }
        Ok(())
    }
}

fn parse_update(update: &str) -> SparqlResult<Vec<(DataOp, String, Triple)>> {
    let mut operations = Vec::new();
    let mut op = None;
    let mut graph: Option<String> = None;

    for (number, raw) in update.lines().enumerate() {
        let line = raw.trim();
        let fail = |reason: &str| SparqlError::invalid(format!("line {}: {reason}", number + 1));
        match line {
            "" => {}
            "DELETE DATA {" if op.is_none() => op = Some(DataOp::Delete),
            "INSERT DATA {" if op.is_none() => op = Some(DataOp::Insert),
            "}" | "} ;" => {
                if graph.take().is_none() && op.take().is_none() {
                    return Err(fail("unbalanced '}'"));
                }
            }
            _ if line.starts_with("GRAPH <") && line.ends_with("> {") => {
                if op.is_none() || graph.is_some() {
                    return Err(fail("GRAPH outside a data block"));
                }
                graph = Some(line["GRAPH <".len()..line.len() - "> {".len()].to_string());
            }
            _ => {
                let (Some(op), Some(graph)) = (op, graph.as_ref()) else {
                    return Err(fail("unsupported update form"));
                };
                match parse_line(line) {
                    Ok(Some(triple)) => operations.push((op, graph.clone(), triple)),
                    Ok(None) => {}
                    Err(reason) => return Err(fail(&reason)),
                }
            }
        }
    }

    if op.is_some() || graph.is_some() {
        return Err(SparqlError::invalid("unterminated data block"));
    }
    Ok(operations)
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SparqlEndpoint for MemoryTripleStore {
    async fn update(&self, update: &str) -> SparqlResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }

        match self.take_failure(update) {
            Some(Failure::Status(status)) => {
                return Err(SparqlError::Status {
                    status,
                    message: "injected failure".to_string(),
                })
            }
            Some(Failure::Connection) => {
                return Err(SparqlError::Connection("injected connection failure".to_string()))
            }
            None => {}
        }

        self.apply(update)?;
        self.applied_updates.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(update.to_string());
        Ok(())
    }

    async fn construct(&self, query: &str) -> SparqlResult<String> {
        let graph = query
            .split_once("GRAPH <")
            .and_then(|(_, rest)| rest.split_once('>'))
            .map(|(graph, _)| graph)
            .ok_or_else(|| SparqlError::invalid("only whole-graph CONSTRUCT is supported"))?;

        Ok(self
            .graph(graph)
            .iter()
            .map(|triple| format!("{}\n", triple.to_ntriples()))
            .collect())
    }

    async fn select(&self, _query: &str) -> SparqlResult<String> {
        Err(SparqlError::invalid("SELECT is not supported by the in-process store"))
    }
}
