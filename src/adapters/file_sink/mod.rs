//! Playback sink that writes appended segments to a file
//!
//! Fragmented MP4 segments concatenate into a playable stream, so appending
//! them in order to one file gives the same result a media buffer would.
//! A JSON timeline next to it records offset and duration per append.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ClipperResult;
use crate::ports::PlaybackSink;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub offset: f64,
    pub bytes: usize,
}

pub struct FilePlaybackSink {
    path: PathBuf,
    file: File,
    duration: f64,
    offset: f64,
    timeline: Vec<TimelineEntry>,
}

impl FilePlaybackSink {
    pub async fn create(path: impl AsRef<Path>) -> ClipperResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file,
            duration: 0.0,
            offset: 0.0,
            timeline: Vec::new(),
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    fn timeline_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".timeline.json");
        PathBuf::from(name)
    }
}

#[async_trait]
impl PlaybackSink for FilePlaybackSink {
    async fn extend_duration(&mut self, seconds: f64) -> ClipperResult<()> {
        self.duration = self.duration.max(seconds);
        Ok(())
    }

    async fn set_write_offset(&mut self, seconds: f64) -> ClipperResult<()> {
        self.offset = seconds;
        Ok(())
    }

    async fn append(&mut self, payload: Vec<u8>) -> ClipperResult<()> {
        self.file.write_all(&payload).await?;
        self.file.flush().await?;
        debug!(offset = self.offset, bytes = payload.len(), "Appended segment");
        self.timeline.push(TimelineEntry {
            offset: self.offset,
            bytes: payload.len(),
        });
        Ok(())
    }

    async fn end_of_stream(&mut self) -> ClipperResult<()> {
        self.file.sync_all().await?;
        let timeline = serde_json::to_vec_pretty(&serde_json::json!({
            "duration": self.duration,
            "segments": self.timeline,
        }))?;
        tokio::fs::write(self.timeline_path(), timeline).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_segments_are_concatenated_with_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.mp4");
        let mut sink = FilePlaybackSink::create(&path).await.unwrap();

        for (index, payload) in [b"aa".to_vec(), b"bbb".to_vec()].into_iter().enumerate() {
            sink.extend_duration(index as f64 + 1.0).await.unwrap();
            sink.set_write_offset(index as f64).await.unwrap();
            sink.append(payload).await.unwrap();
        }
        sink.end_of_stream().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"aabbb");
        assert_eq!(sink.duration(), 2.0);
        assert_eq!(sink.timeline()[1].offset, 1.0);

        let timeline = tokio::fs::read_to_string(dir.path().join("preview.mp4.timeline.json"))
            .await
            .unwrap();
        assert!(timeline.contains("\"duration\": 2.0"));
    }
}
