use anyhow::Result;
use clap::Parser;
use graphkiln_cli::cli::{Cli, Commands};
use graphkiln_cli::commands;
use graphkiln_config::GraphkilnConfig;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level: LevelFilter = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        cli.log_level.map(Into::into).unwrap_or(LevelFilter::WARN)
    };
    // RUST_LOG wins over the flags when set
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = GraphkilnConfig::load(cli.config.as_deref())?;
    debug!(backend = %config.backend.type_key, graph = %config.graph.graph_uri, "Configuration loaded");

    let success = match cli.command {
        Commands::Sync { input, prune } => commands::sync::execute(&config, &input, prune).await?,
        Commands::Status { input } => commands::status::execute(&config, input.as_deref()).await?,
        Commands::Backends => commands::backends::execute()?,
        Commands::Verify { input } => commands::verify::execute(&config, &input).await?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
