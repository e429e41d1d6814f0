//! RecallBrief CLI: enrich food-recall records into report-ready rows.
//!
//! Resolves record ids, downloads their artifacts, runs the remote document
//! and classification workflows and writes one merged JSON report.

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
