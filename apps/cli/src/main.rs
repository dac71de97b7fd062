//! SkillSync CLI: incremental sync of the skills catalog.
//!
//! Discovers skill entries in seed repositories, refreshes only what changed,
//! enriches new records with generated descriptions and writes `skills.json`.

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
