//! Beadgraph CLI binary.

use anyhow::Result;
use beadgraph::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the beadgraph CLI.
///
/// The current_thread runtime is enough: detail fetches are child processes,
/// so their concurrency does not depend on worker threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays reserved for rendered graphs.
    // Example: RUST_LOG=beadgraph=debug beadgraph --once
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("beadgraph=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("Starting beadgraph");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Beadgraph exited cleanly");
    Ok(())
}
