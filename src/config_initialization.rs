//! Configuration initialization and hierarchy management

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::adapters::toml_config::{ClipperConfig, DEFAULT_CONFIG_FILE};
use crate::cli::{Cli, Commands};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CLIPSTREAM_";

const ENV_KEYS: &[&str] = &[
    "ffmpeg_path",
    "ffprobe_path",
    "gifsicle_path",
    "poll_interval_ms",
    "segment_seconds",
    "preview_max_width",
    "work_dir",
    "log_level",
    "log_format",
];

/// Resolve configuration with precedence CLI > environment > file > defaults
pub fn resolve_configuration(cli: &Cli) -> Result<ClipperConfig> {
    resolve_with(cli, |name| std::env::var(name).ok())
}

/// Same as [`resolve_configuration`] with an injectable environment
pub fn resolve_with<F>(cli: &Cli, env: F) -> Result<ClipperConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_config_file(cli.config.as_deref())?;
    apply_environment(&mut config, env)?;
    apply_cli_overrides(&mut config, cli)?;
    debug!(?config, "Resolved configuration");
    Ok(config)
}

/// Explicit `--config` must exist; the default file is optional
fn load_config_file(explicit: Option<&Path>) -> Result<ClipperConfig> {
    if let Some(path) = explicit {
        return ClipperConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()));
    }
    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.exists() {
        return ClipperConfig::load(default).context("Failed to load clipstream.toml");
    }
    Ok(ClipperConfig::default())
}

fn apply_environment<F>(config: &mut ClipperConfig, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for key in ENV_KEYS {
        let name = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
        if let Some(value) = env(&name) {
            config
                .set(key, &value)
                .with_context(|| format!("Invalid value in {name}"))?;
        }
    }
    Ok(())
}

fn apply_cli_overrides(config: &mut ClipperConfig, cli: &Cli) -> Result<()> {
    let mut overrides: Vec<(&str, String)> = Vec::new();
    if let Some(level) = &cli.log_level {
        overrides.push(("log_level", level.clone()));
    }
    if let Some(format) = &cli.log_format {
        overrides.push(("log_format", format.clone()));
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        overrides.push(("ffmpeg_path", ffmpeg.display().to_string()));
    }
    if let Some(work_dir) = &cli.work_dir {
        overrides.push(("work_dir", work_dir.display().to_string()));
    }
    if let Commands::Preview(args) = &cli.command {
        if let Some(seconds) = args.segment_seconds {
            overrides.push(("segment_seconds", seconds.to_string()));
        }
        if let Some(width) = args.max_width {
            overrides.push(("preview_max_width", width.to_string()));
        }
    }

    for (key, value) in overrides {
        config
            .set(key, &value)
            .with_context(|| format!("Invalid command-line value for {key}"))?;
    }
    Ok(())
}
