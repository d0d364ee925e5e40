//! JSON Lines snapshot input
//!
//! One document per line:
//!
//! ```json
//! {"document_id": "notes/a.md", "triples": [{"subject": {"type": "iri", "value": "urn:doc:a"}, ...}]}
//! {"document_id": "notes/gone.md", "triples": []}
//! ```
//!
//! `graph_uri` is optional and defaults to the configured graph. An empty
//! `triples` list retracts the document.

use anyhow::{Context, Result};
use graphkiln_core::{DocumentSnapshot, Triple, TripleSet};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotLine {
    document_id: String,
    #[serde(default)]
    graph_uri: Option<String>,
    #[serde(default)]
    triples: Vec<Triple>,
    #[serde(default)]
    entities: BTreeSet<String>,
}

/// Read snapshots from a file, or stdin for `-`
pub fn read_snapshots(path: &Path, default_graph: &str) -> Result<Vec<DocumentSnapshot>> {
    if path == Path::new("-") {
        return parse_snapshots(std::io::stdin().lock(), default_graph).context("reading stdin");
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening input {}", path.display()))?;
    parse_snapshots(file, default_graph).with_context(|| format!("reading {}", path.display()))
}

/// Parse JSON Lines; blank lines are skipped
pub fn parse_snapshots(reader: impl Read, default_graph: &str) -> Result<Vec<DocumentSnapshot>> {
    let mut snapshots = Vec::new();
    for (number, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: SnapshotLine =
            serde_json::from_str(&line).with_context(|| format!("line {}", number + 1))?;
        let graph_uri = parsed.graph_uri.unwrap_or_else(|| default_graph.to_string());
        snapshots.push(DocumentSnapshot::new(
            parsed.document_id,
            TripleSet::from_triples(graph_uri, parsed.triples),
            parsed.entities,
        ));
    }
    Ok(snapshots)
}
