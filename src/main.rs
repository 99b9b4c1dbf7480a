//! FragCut video clip pipeline
//!
//! Validates trim and export requests against the probed source, runs them
//! through FFmpeg with progress reporting, and prints a structured result.
//!
//! # Usage
//!
//! ```bash
//! fragcut trim -i video.mp4 --start 5 --end 10
//! fragcut export -i video.mp4 --preset 9:16
//! fragcut probe -i video.mp4 --json
//! fragcut verify -i video_trimmed.mp4 --duration 5
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use fragcut::adapters::init_logging;
use fragcut::app::DefaultAppContainer;
use fragcut::cli::{commands, Cli};
use fragcut::config_initialization::initialize_configuration_hierarchy;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = initialize_configuration_hierarchy(&cli)?;
    init_logging(&resolved.config.logging, cli.verbose)?;
    resolved.log_summary();
    debug!("Effective configuration: {:?}", resolved.config);

    let container = DefaultAppContainer::new(&resolved.config)?;
    commands::run(&container, cli.command).await?;

    info!("FragCut completed successfully");
    Ok(())
}
