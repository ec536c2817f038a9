// Preview interactor - Live segmented transcode fed into a playback sink

use std::sync::Arc;

use tracing::info;

use crate::app::message_log::MessageLog;
use crate::app::worker::{EngineWorker, StreamJob, WorkerJob};
use crate::engine::{output_ref, INPUT_REF};
use crate::error::ClipperResult;
use crate::planner::InvocationBuilder;
use crate::ports::{PlaybackSink, SourcePort};
use crate::streaming::{FeedReport, PlaybackFeeder, WorkerMessage};

/// Segment container; fragmented mp4 appends cleanly
pub const SEGMENT_EXTENSION: &str = "mp4";

/// Live preview parameters
#[derive(Debug, Clone, Copy)]
pub struct PreviewSettings {
    pub segment_seconds: f64,
    pub max_width: u32,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 1.0,
            max_width: 1280,
        }
    }
}

pub struct PreviewInteractor {
    source: Arc<dyn SourcePort>,
    worker: EngineWorker,
    settings: PreviewSettings,
}

impl PreviewInteractor {
    pub fn new(source: Arc<dyn SourcePort>, worker: EngineWorker, settings: PreviewSettings) -> Self {
        Self {
            source,
            worker,
            settings,
        }
    }

    /// Transcode `reference` into segments and feed them to `sink` as they finish
    pub async fn execute<S, F>(
        &self,
        reference: &str,
        sink: S,
        mut on_message: F,
    ) -> ClipperResult<(FeedReport, S, MessageLog)>
    where
        S: PlaybackSink,
        F: FnMut(&WorkerMessage) + Send,
    {
        let source = self.source.acquire(reference).await?;
        let pattern = output_ref(&format!("%d.{SEGMENT_EXTENSION}"));
        let invocation = InvocationBuilder::build_preview(
            INPUT_REF,
            &pattern,
            self.settings.segment_seconds,
            self.settings.max_width,
        );
        info!(reference, "Starting live preview");

        let mut receiver = self.worker.submit(WorkerJob::Stream(StreamJob {
            input: source.bytes,
            args: invocation.into_args(),
            segment_extension: SEGMENT_EXTENSION.to_string(),
            expected_duration: 0.0,
        }));

        let mut log = MessageLog::new();
        let mut feeder = PlaybackFeeder::new(sink, self.settings.segment_seconds);
        let report = feeder
            .consume(&mut receiver, |message| {
                log.record(message);
                on_message(message);
            })
            .await?;
        info!(segments = report.appended, "Live preview finished");
        Ok((report, feeder.into_sink(), log))
    }
}
