//! Prospector CLI: budget-gated enrichment of business leads.
//!
//! Runs entity files through the configured providers and reports a
//! confidence score for each record.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
