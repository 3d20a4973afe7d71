// adaptgen - quality-gated content generation
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use adaptgen::cli::{handle_command, Cli, CommandContext};
use adaptgen::config::load_config;
use adaptgen::feedback::FeedbackStore;
use adaptgen::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let store = FeedbackStore::open(&config.storage.database_path).with_context(|| {
        format!(
            "Failed to open feedback store at {}",
            config.storage.database_path.display()
        )
    })?;
    tracing::debug!("Feedback store: {}", store.location());

    let ctx = CommandContext::new(Arc::new(config), Arc::new(store));
    let output = handle_command(cli.command, &ctx).await?;
    print!("{}", output);

    Ok(())
}
