use super::open_engine;
use crate::input::read_snapshots;
use anyhow::Result;
use graphkiln_config::GraphkilnConfig;
use graphkiln_core::{DocumentId, SyncStatus};
use std::collections::BTreeMap;
use std::path::Path;

pub async fn execute(config: &GraphkilnConfig, input: Option<&Path>) -> Result<bool> {
    let engine = open_engine(config).await?;
    let records = engine.records();

    // recorded documents, then whatever the input adds with its current hash
    let mut hashes: BTreeMap<DocumentId, Option<String>> = records
        .document_ids()
        .await?
        .into_iter()
        .map(|id| (id, None))
        .collect();
    if let Some(input) = input {
        for snapshot in read_snapshots(input, &config.graph.graph_uri)? {
            let hash = snapshot.triples.set_hash();
            hashes.insert(snapshot.document_id, Some(hash));
        }
    }

    let mut pending = 0usize;
    for (document_id, hash) in &hashes {
        let status = records.status_of(document_id, hash.as_deref()).await?;
        if status.needs_sync() {
            pending += 1;
        }
        println!("{:<16} {document_id}", status_label(status));
    }
    println!("{} documents, {pending} need sync", hashes.len());

    engine.close().await?;
    Ok(true)
}

fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::StaleDetected => "stale",
        other => other.as_str(),
    }
}
