//! MVP Factory CLI: idea in, runnable MVP project out.
//!
//! Plans, designs, generates, persists and repairs a project tree with a
//! text-generation model, checkpointing after every phase.

mod commands;
mod menu;
mod progress;

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
