//! CLI module for Clipstream
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

/// Clipstream
///
/// Trims, crops, scales, retimes and converts media clips by driving an ffmpeg
/// engine, or streams a live fragmented-MP4 preview of a source.
#[derive(Parser, Debug)]
#[command(name = "clipstream")]
#[command(about = "Clipstream - media clips and live previews through ffmpeg")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level or filter directive
    #[arg(long, global = true, env = "CLIPSTREAM_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, env = "CLIPSTREAM_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Configuration file (default: clipstream.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Engine binary
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,

    /// Parent directory for the engine working directory
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produce a clip from a source file
    Clip(args::ClipArgs),
    /// Print the filter graph and engine arguments of a clip without running it
    Plan(args::PlanArgs),
    /// Stream a segmented preview of a source into a playback file
    Preview(args::PreviewArgs),
    /// Re-encode a source into a plain mp4
    Normalize(args::NormalizeArgs),
}
