//! Clipstream Library
//!
//! Turns a clip specification (trim window, crop, scale, frame rate, speed,
//! boomerang, fade-out, loop, output format) into ffmpeg filter graphs and
//! argument lists, runs them on a single-flight engine, and streams
//! segmented previews into an ordered playback sink.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod planner;
pub mod ports;
pub mod streaming;
pub mod utils;

// Re-export commonly used types
pub use domain::errors::ValidationError;
pub use domain::model::{ClipFlags, ClipSpecification, CropRect, OutputFormat, TimeRange, ValidSpec};
pub use error::{ClipperError, ClipperResult};
