//! Tracelink CLI binary.

use anyhow::Result;
use tracelink::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the tracelink CLI.
///
/// Classifier calls run concurrently on the current thread; no work here is
/// CPU bound enough to need worker threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Example: RUST_LOG=tracelink=debug,tracelink_store=trace tracelink build --doc srs
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tracelink=info,tracelink_store=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting tracelink CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Tracelink CLI completed successfully");
    Ok(())
}
