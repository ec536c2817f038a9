//! Local file source adapter
//!
//! Accepts `file:<path>` or a bare path. Bytes are read once and cached by
//! reference; dimensions and frame rate come from `ffprobe` JSON output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ClipperError, ClipperResult};
use crate::ports::{SourceMedia, SourcePort};

/// Video stream properties reported by ffprobe
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbedStream {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Parse `ffprobe -print_format json -show_streams` output
pub fn parse_probe_json(json: &str) -> ClipperResult<ProbedStream> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let Some(video) = output
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
    else {
        return Ok(ProbedStream::default());
    };

    let fps = [&video.avg_frame_rate, &video.r_frame_rate]
        .into_iter()
        .flatten()
        .filter_map(|rate| parse_frame_rate(rate))
        .next()
        .unwrap_or(0.0);

    Ok(ProbedStream {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
    })
}

/// `30000/1001` style rate; `0/0` and garbage give `None`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Source adapter for files on the local disk
pub struct FileSourceAdapter {
    ffprobe: PathBuf,
    cache: Mutex<HashMap<String, Arc<SourceMedia>>>,
}

impl FileSourceAdapter {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(reference: &str) -> PathBuf {
        PathBuf::from(reference.strip_prefix("file:").unwrap_or(reference))
    }

    async fn probe(&self, path: &Path) -> ProbedStream {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                match parse_probe_json(&String::from_utf8_lossy(&output.stdout)) {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!(error = %err, "Unreadable ffprobe output");
                        ProbedStream::default()
                    }
                }
            }
            Ok(output) => {
                warn!(status = %output.status, path = %path.display(), "ffprobe failed");
                ProbedStream::default()
            }
            Err(err) => {
                warn!(error = %err, "ffprobe unavailable, source metadata unknown");
                ProbedStream::default()
            }
        }
    }

    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl SourcePort for FileSourceAdapter {
    async fn acquire(&self, reference: &str) -> ClipperResult<SourceMedia> {
        if let Some(media) = self.cache.lock().await.get(reference) {
            debug!(reference, "Source cache hit");
            return Ok(media.as_ref().clone());
        }

        let path = Self::resolve(reference);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ClipperError::SourceUnavailable {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;
        let probed = self.probe(&path).await;
        let title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("clip")
            .to_string();

        info!(
            reference,
            bytes = bytes.len(),
            width = probed.width,
            height = probed.height,
            fps = probed.fps,
            "Acquired source"
        );
        let media = Arc::new(SourceMedia {
            bytes,
            title,
            probed_width: probed.width,
            probed_height: probed.height,
            probed_fps: probed.fps,
        });
        self.cache
            .lock()
            .await
            .insert(reference.to_string(), Arc::clone(&media));
        Ok(media.as_ref().clone())
    }
}
