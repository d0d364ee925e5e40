use super::open_engine;
use crate::input::read_snapshots;
use anyhow::Result;
use graphkiln_config::GraphkilnConfig;
use graphkiln_sync::CancellationToken;
use std::path::Path;
use tracing::{info, warn};

pub async fn execute(config: &GraphkilnConfig, input: &Path, prune: bool) -> Result<bool> {
    let snapshots = read_snapshots(input, &config.graph.graph_uri)?;
    let engine = open_engine(config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight batches");
            on_interrupt.cancel();
        }
    });

    info!(documents = snapshots.len(), prune, "Starting sync");
    let outcome = if prune {
        engine.reconcile_corpus(snapshots, &cancel).await
    } else {
        engine.run(snapshots, &cancel).await
    };
    watcher.abort();
    engine.close().await?;

    let summary = outcome?;
    println!("{summary}");
    Ok(summary.is_success())
}
