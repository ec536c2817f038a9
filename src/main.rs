//! Clipstream CLI
//!
//! # Usage
//!
//! ```bash
//! clipstream clip -i video.mov -s 00:01:00 -e 00:01:04 -f gif --boomerang --optimize
//! clipstream plan -i video.mov -s 3 -e 5 -f mp4 --crop 0.1,0.1,0.5,0.5
//! clipstream preview -i video.mov -o preview.mp4
//! clipstream normalize -i video.avi
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use clipstream::app::container::DefaultAppContainer;
use clipstream::cli::{commands, Cli, Commands};
use clipstream::config_initialization::resolve_configuration;
use clipstream::utils::logging::{self, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_configuration(&cli)?;

    let log_config = LoggingConfig::new(&config.log_level, &config.log_format)
        .context("Invalid logging configuration")?;
    logging::init(&log_config).context("Failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Clipstream");

    match cli.command {
        // Planning needs no engine
        Commands::Plan(args) => commands::plan(args)?,
        command => {
            let container =
                DefaultAppContainer::new(&config).context("Failed to set up the engine")?;
            match command {
                Commands::Clip(args) => commands::clip(&container, args).await?,
                Commands::Preview(args) => commands::preview(&container, args).await?,
                Commands::Normalize(args) => commands::normalize(&container, args).await?,
                Commands::Plan(_) => {}
            }
        }
    }

    info!("Clipstream completed successfully");
    Ok(())
}
