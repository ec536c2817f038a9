// Engine worker - Owns the transcode engine and runs jobs on its own tasks

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::progress::{ProgressPhase, ProgressTracker};
use crate::engine::{EngineJob, EngineState, TranscodeEngine};
use crate::error::{ClipperError, ClipperResult};
use crate::streaming::{job_channel, JobChannel, JobReceiver, OutputBlob, SegmentPoller};

/// Caller-visible job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Loading,
    Running,
    Streaming,
    Completed,
    Failed,
}

/// A job producing one output file
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: Vec<u8>,
    pub args: Vec<String>,
    /// Output name inside the engine filesystem
    pub output_name: String,
    pub file_name: String,
    pub mime_type: String,
    /// Expected media duration, for progress
    pub expected_duration: f64,
    /// Serve an existing output with the same name instead of running
    pub reuse_output: bool,
}

/// A job producing numbered segments while it runs
#[derive(Debug, Clone)]
pub struct StreamJob {
    pub input: Vec<u8>,
    pub args: Vec<String>,
    pub segment_extension: String,
    pub expected_duration: f64,
}

#[derive(Debug)]
pub enum WorkerJob {
    Batch(BatchJob),
    Stream(StreamJob),
}

struct WorkerCommand {
    job: WorkerJob,
    channel: JobChannel,
}

/// Tunables of the worker context
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: crate::streaming::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Handle to the worker context. Cloning shares the same engine.
#[derive(Clone)]
pub struct EngineWorker {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    state: watch::Receiver<JobState>,
    engine: Arc<TranscodeEngine>,
}

impl EngineWorker {
    /// Start the worker context; must be called inside a Tokio runtime
    pub fn spawn(engine: TranscodeEngine, settings: WorkerSettings) -> Self {
        let engine = Arc::new(engine);
        let (commands, mut inbox) = mpsc::unbounded_channel::<WorkerCommand>();
        let (state_tx, state) = watch::channel(JobState::Idle);
        let state_tx = Arc::new(state_tx);

        let worker_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Some(command) = inbox.recv().await {
                // One task per job: a job submitted while another runs reaches the
                // engine and is rejected there instead of queueing.
                tokio::spawn(run_job(
                    Arc::clone(&worker_engine),
                    command,
                    Arc::clone(&state_tx),
                    settings,
                ));
            }
            debug!("Engine worker stopped");
        });

        Self {
            commands,
            state,
            engine,
        }
    }

    /// Hand a job to the worker; its input bytes move with it
    pub fn submit(&self, job: WorkerJob) -> JobReceiver {
        let (channel, receiver) = job_channel();
        if self.commands.send(WorkerCommand { job, channel }).is_err() {
            warn!("Engine worker is gone, job dropped");
        }
        receiver
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    pub fn job_state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }
}

async fn run_job(
    engine: Arc<TranscodeEngine>,
    command: WorkerCommand,
    state: Arc<watch::Sender<JobState>>,
    settings: WorkerSettings,
) {
    let WorkerCommand { job, channel } = command;

    channel.progress(ProgressPhase::Initializing.message());
    publish_unless_running(&engine, &state, JobState::Loading);
    if let Err(err) = engine.load().await {
        state.send_replace(JobState::Failed);
        channel.fail(&err);
        return;
    }

    let result = match job {
        WorkerJob::Batch(job) => run_batch(&engine, job, &channel, &state).await,
        WorkerJob::Stream(job) => run_stream(&engine, job, &channel, &state, settings).await,
    };

    match result {
        Ok(output) => {
            state.send_replace(JobState::Completed);
            channel.progress(ProgressPhase::Done.message());
            channel.done(output);
        }
        Err(ClipperError::ConcurrentJob) => {
            // The running job owns the state
            channel.fail(&ClipperError::ConcurrentJob);
        }
        Err(err) => {
            warn!(error = %err, "Job failed");
            state.send_replace(JobState::Failed);
            channel.fail(&err);
        }
    }
}

/// A job that will be rejected must not overwrite the running job's state
fn publish_unless_running(
    engine: &TranscodeEngine,
    state: &watch::Sender<JobState>,
    next: JobState,
) {
    if engine.state() != EngineState::Running {
        state.send_replace(next);
    }
}

async fn run_batch(
    engine: &TranscodeEngine,
    job: BatchJob,
    channel: &JobChannel,
    state: &watch::Sender<JobState>,
) -> ClipperResult<Option<OutputBlob>> {
    let BatchJob {
        input,
        args,
        output_name,
        file_name,
        mime_type,
        expected_duration,
        reuse_output,
    } = job;

    if reuse_output && engine.state() == EngineState::Ready && engine.output_exists(&output_name).await
    {
        info!(%output_name, "Reusing existing output");
        channel.log(format!("Reusing {output_name}"));
        let bytes = engine.read_output(&output_name).await?;
        return Ok(Some(OutputBlob {
            file_name,
            mime_type,
            bytes,
        }));
    }

    channel.progress(ProgressPhase::Loading.message());
    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    let mut relay = LineRelay::new(channel, expected_duration);
    publish_unless_running(engine, state, JobState::Running);
    channel.progress(ProgressPhase::Running.message());
    let run = engine.run(EngineJob { input, args }, Some(lines_tx));
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            biased;
            Some(line) = lines.recv() => relay.forward(line),
            result = &mut run => {
                while let Ok(line) = lines.try_recv() {
                    relay.forward(line);
                }
                break result;
            }
        }
    };

    if let Err(err) = result {
        if !matches!(err, ClipperError::ConcurrentJob) {
            if let Err(cleanup) = engine.fs().remove_output(&output_name).await {
                warn!(error = %cleanup, "Failed to remove partial output");
            }
        }
        return Err(err);
    }

    let bytes = engine.read_output(&output_name).await?;
    Ok(Some(OutputBlob {
        file_name,
        mime_type,
        bytes,
    }))
}

async fn run_stream(
    engine: &TranscodeEngine,
    job: StreamJob,
    channel: &JobChannel,
    state: &watch::Sender<JobState>,
    settings: WorkerSettings,
) -> ClipperResult<Option<OutputBlob>> {
    let StreamJob {
        input,
        args,
        segment_extension,
        expected_duration,
    } = job;

    if engine.state() == EngineState::Ready {
        engine.fs().clear_segments().await?;
    }

    channel.progress(ProgressPhase::Loading.message());
    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    let mut relay = LineRelay::new(channel, expected_duration);
    let mut poller = SegmentPoller::new(segment_extension, settings.poll_interval);
    publish_unless_running(engine, state, JobState::Streaming);
    channel.progress(ProgressPhase::Running.message());
    let run = engine.run(EngineJob { input, args }, Some(lines_tx));
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            biased;
            result = &mut run => {
                while let Ok(line) = lines.try_recv() {
                    relay.forward(line);
                }
                break result;
            }
            Some(line) = lines.recv() => relay.forward(line),
            _ = poller.tick() => {
                poller.poll_quietly(engine.fs(), channel).await;
            }
        }
    };
    result?;

    poller.drain(engine.fs(), channel).await?;
    Ok(None)
}

/// Relays engine lines as log messages and derives progress from them
struct LineRelay<'a> {
    channel: &'a JobChannel,
    tracker: ProgressTracker,
}

impl<'a> LineRelay<'a> {
    fn new(channel: &'a JobChannel, expected_duration: f64) -> Self {
        Self {
            channel,
            tracker: ProgressTracker::new(expected_duration),
        }
    }

    fn forward(&mut self, line: String) {
        if let Some(percent) = self.tracker.observe(&line) {
            self.channel
                .progress(format!("{} {percent}%", ProgressPhase::Running));
        }
        self.channel.log(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::{ScriptedBackend, ScriptedRun};
    use crate::streaming::WorkerMessage;

    fn worker(backend: ScriptedBackend) -> EngineWorker {
        let engine = TranscodeEngine::new(Arc::new(backend), None).unwrap();
        EngineWorker::spawn(
            engine,
            WorkerSettings {
                poll_interval: Duration::from_millis(10),
            },
        )
    }

    fn batch(output_name: &str) -> BatchJob {
        BatchJob {
            input: b"source".to_vec(),
            args: vec!["-i".into(), "input/tmpfile".into(), format!("output/{output_name}")],
            output_name: output_name.to_string(),
            file_name: "clip.gif".to_string(),
            mime_type: "image/gif".to_string(),
            expected_duration: 2.0,
            reuse_output: true,
        }
    }

    async fn collect(mut receiver: JobReceiver) -> Vec<WorkerMessage> {
        let mut messages = Vec::new();
        while let Some(message) = receiver.recv().await {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_batch_job_delivers_output_last() {
        let backend = ScriptedBackend::new().with_run(
            ScriptedRun::success()
                .line("frame=10 time=00:00:01.00 bitrate=1")
                .write_output("a.gif", b"GIF89a".to_vec()),
        );
        let worker = worker(backend);
        let messages = collect(worker.submit(WorkerJob::Batch(batch("a.gif")))).await;

        assert!(messages
            .iter()
            .any(|m| matches!(m, WorkerMessage::Progress { text } if text == "Running engine 50%")));
        match messages.last() {
            Some(WorkerMessage::Done { output: Some(blob) }) => {
                assert_eq!(blob.bytes, b"GIF89a");
                assert_eq!(blob.file_name, "clip.gif");
            }
            other => panic!("unexpected last message: {other:?}"),
        }
        assert_eq!(worker.job_state(), JobState::Completed);
        assert_eq!(worker.engine_state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_existing_output_is_reused_without_running() {
        let backend = ScriptedBackend::new()
            .with_run(ScriptedRun::success().write_output("a.gif", b"first".to_vec()));
        let worker = worker(backend.clone());
        collect(worker.submit(WorkerJob::Batch(batch("a.gif")))).await;
        let messages = collect(worker.submit(WorkerJob::Batch(batch("a.gif")))).await;

        assert_eq!(backend.launched_args().len(), 1);
        assert!(matches!(
            messages.last(),
            Some(WorkerMessage::Done { output: Some(blob) }) if blob.bytes == b"first"
        ));
    }

    #[tokio::test]
    async fn test_failed_run_is_relayed_and_partial_output_removed() {
        let backend = ScriptedBackend::new().with_run(
            ScriptedRun::exit(1)
                .write_output("a.gif", b"partial".to_vec())
                .line("Conversion failed!"),
        );
        let worker = worker(backend);
        let messages = collect(worker.submit(WorkerJob::Batch(batch("a.gif")))).await;

        match messages.last() {
            Some(WorkerMessage::Error { detail }) => {
                assert_eq!(detail.kind, crate::error::FailureKind::EngineRun);
                assert_eq!(detail.diagnostics, vec!["Conversion failed!"]);
            }
            other => panic!("unexpected last message: {other:?}"),
        }
        assert_eq!(worker.job_state(), JobState::Failed);
        assert!(!worker.engine.output_exists("a.gif").await);
    }

    #[tokio::test]
    async fn test_stream_job_delivers_every_segment_in_order() {
        let backend = ScriptedBackend::new()
            .with_run(ScriptedRun::success().segments(4, Duration::from_millis(15)));
        let worker = worker(backend);
        let messages = collect(worker.submit(WorkerJob::Stream(StreamJob {
            input: b"source".to_vec(),
            args: vec![],
            segment_extension: "mp4".to_string(),
            expected_duration: 4.0,
        })))
        .await;

        let indices: Vec<u64> = messages
            .iter()
            .filter_map(|m| match m {
                WorkerMessage::Segment { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(matches!(messages.last(), Some(WorkerMessage::Done { output: None })));
    }

    #[tokio::test]
    async fn test_rejected_job_leaves_running_job_state() {
        let backend = ScriptedBackend::new()
            .with_run(ScriptedRun::success().segments(3, Duration::from_millis(100)));
        let worker = worker(backend.clone());
        let stream = worker.submit(WorkerJob::Stream(StreamJob {
            input: b"source".to_vec(),
            args: vec![],
            segment_extension: "mp4".to_string(),
            expected_duration: 3.0,
        }));

        tokio::time::timeout(Duration::from_secs(5), async {
            while worker.engine_state() != EngineState::Running
                || worker.job_state() != JobState::Streaming
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let rejected = collect(worker.submit(WorkerJob::Batch(BatchJob {
            reuse_output: false,
            ..batch("b.gif")
        })))
        .await;

        match rejected.last() {
            Some(WorkerMessage::Error { detail }) => {
                assert_eq!(detail.kind, crate::error::FailureKind::ConcurrentJob);
            }
            other => panic!("unexpected last message: {other:?}"),
        }
        assert_eq!(worker.job_state(), JobState::Streaming);

        let streamed = collect(stream).await;
        assert!(matches!(streamed.last(), Some(WorkerMessage::Done { output: None })));
        assert_eq!(worker.job_state(), JobState::Completed);
        assert_eq!(backend.launched_args().len(), 1);
    }
}
