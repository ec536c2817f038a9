// Ports - Interface definitions (contracts)

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ClipperResult;

/// Port for the transcoding engine itself.
///
/// The engine has no structured return channel: `launch` only starts the job.
/// Everything the engine says arrives as text lines on `lines`, and completion
/// is announced by the sentinel line (see [`crate::engine::COMPLETION_SENTINEL`]).
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// One-time initialization; returns a version/description string
    async fn initialize(&self) -> ClipperResult<String>;

    /// Start a run with `args`, relative to `workdir`, streaming log lines into `lines`
    async fn launch(
        &self,
        args: Vec<String>,
        workdir: &Path,
        lines: mpsc::UnboundedSender<String>,
    ) -> ClipperResult<()>;
}

/// Source media as delivered by the acquisition collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMedia {
    pub bytes: Vec<u8>,
    pub title: String,
    pub probed_width: u32,
    pub probed_height: u32,
    pub probed_fps: f64,
}

/// Port for turning a source reference into bytes and probed metadata
#[async_trait]
pub trait SourcePort: Send + Sync {
    /// Fails with `SourceUnavailable`; never retried here
    async fn acquire(&self, reference: &str) -> ClipperResult<SourceMedia>;
}

/// Port for a buffered playback destination that accepts ordered appends
#[async_trait]
pub trait PlaybackSink: Send {
    /// Grow the addressable duration to at least `seconds`
    async fn extend_duration(&mut self, seconds: f64) -> ClipperResult<()>;

    /// Position the next append at `seconds`
    async fn set_write_offset(&mut self, seconds: f64) -> ClipperResult<()>;

    /// Append one payload; returns once the sink has settled it
    async fn append(&mut self, payload: Vec<u8>) -> ClipperResult<()>;

    /// No more appends will follow
    async fn end_of_stream(&mut self) -> ClipperResult<()>;
}

/// Port for the gif post-processing optimizer
#[async_trait]
pub trait OptimizerPort: Send + Sync {
    async fn optimize(&self, gif: &[u8]) -> ClipperResult<Vec<u8>>;
}
