//! Prospector CLI: find, prioritize, and enrich contacts at a company domain.
//!
//! Runs the collection, scoring, and enrichment pipeline against live
//! services and keeps run history in a local database.

mod commands;
mod output;

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
