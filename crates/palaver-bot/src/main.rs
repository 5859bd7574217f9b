//! Main entry point for Palaver.

use anyhow::{Context, Result};
use clap::Parser;
use palaver_bot::PalaverBot;
use palaver_config::ConfigLoader;
use std::path::PathBuf;
use tracing::info;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PALAVER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigLoader::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Held until exit so buffered file output is written.
    let _guard = palaver_common::init_logging(&config.logging.to_logging_config())
        .context("Failed to initialise logging")?;

    config
        .validate_for_runtime()
        .context("Configuration is incomplete")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        bot = %config.telegram.bot_username,
        "Starting Palaver"
    );

    let bot = PalaverBot::build(&config).context("Failed to start Palaver")?;
    bot.run().await.context("Palaver stopped with an error")?;

    info!("Palaver stopped");
    Ok(())
}
