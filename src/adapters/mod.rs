// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod file_sink;
pub mod gifsicle;
pub mod scripted;
pub mod source_file;
pub mod toml_config;

// Re-export adapters
pub use exec_ffmpeg::FFmpegBackend;
pub use file_sink::FilePlaybackSink;
pub use gifsicle::GifsicleOptimizer;
pub use scripted::{ScriptedBackend, ScriptedRun};
pub use source_file::FileSourceAdapter;
pub use toml_config::ClipperConfig;
