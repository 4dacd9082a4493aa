//! repodigest - a CLI for generating token-budgeted repository digests

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use repodigest::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "repodigest=debug"
    } else if cli.quiet {
        "repodigest=error"
    } else {
        "repodigest=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli).await
}
