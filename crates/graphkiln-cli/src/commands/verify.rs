use super::open_engine;
use crate::input::read_snapshots;
use anyhow::Result;
use graphkiln_config::GraphkilnConfig;
use std::path::Path;

pub async fn execute(config: &GraphkilnConfig, input: &Path) -> Result<bool> {
    let snapshots = read_snapshots(input, &config.graph.graph_uri)?;
    let engine = open_engine(config).await?;
    let reports = engine.verify(&snapshots).await?;
    engine.close().await?;

    let mut clean = true;
    for report in &reports {
        if report.is_clean() {
            println!("{}: ok", report.graph_uri);
            continue;
        }
        clean = false;
        println!(
            "{}: {} missing, {} unexpected",
            report.graph_uri,
            report.missing.len(),
            report.unexpected.len()
        );
        for triple in &report.missing {
            println!("  - {}", triple.to_ntriples());
        }
        for triple in &report.unexpected {
            println!("  + {}", triple.to_ntriples());
        }
    }
    Ok(clean)
}
