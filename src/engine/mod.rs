//! Transcode engine adapter
//!
//! Wraps an [`EngineBackend`] in an explicit state machine:
//! `Unloaded -> Loading -> Ready -> Running -> Ready`, with
//! `Running -> Failed -> Ready` when a run fails. Exactly one run may be in
//! flight; a second `run` fails immediately with `ConcurrentJob`.
//!
//! The backend has no structured return channel. Completion is detected by
//! scanning every log line for [`COMPLETION_SENTINEL`].

pub mod progress;
pub mod vfs;

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{ClipperError, ClipperResult};
use crate::ports::EngineBackend;

pub use vfs::{output_ref, VirtualFs, INPUT_REF, OUTPUT_DIR};

/// Log line announcing the end of a run, optionally followed by an exit code
pub const COMPLETION_SENTINEL: &str = "FFMPEG_END";

/// Arguments prepended to every run
pub const DEFAULT_ARGS: [&str; 2] = ["-nostdin", "-y"];

/// Engine lines kept for failure diagnostics
const DIAGNOSTIC_LINES: usize = 20;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    Running,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Parse a sentinel line into the exit code it carries
pub fn parse_sentinel(line: &str) -> Option<i32> {
    let rest = line.trim().strip_prefix(COMPLETION_SENTINEL)?;
    if rest.is_empty() {
        return Some(0);
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.trim().parse().ok()
}

/// How a run ended, as seen from the log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Exited(i32),
    /// The line stream closed without a sentinel
    Disconnected,
}

/// Single-resolution completion handle shared with the log pump
#[derive(Clone)]
pub struct CompletionSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<RunOutcome>>>>,
}

impl CompletionSignal {
    pub fn new() -> (Self, oneshot::Receiver<RunOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Resolve the pending completion; later calls return `false` and do nothing
    pub fn resolve(&self, outcome: RunOutcome) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(sender) => {
                // The receiver may already be gone if the run future was dropped
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.sender
            .lock()
            .map(|sender| sender.is_none())
            .unwrap_or(true)
    }
}

/// One engine run: input bytes and arguments (without [`DEFAULT_ARGS`])
#[derive(Debug, Clone)]
pub struct EngineJob {
    pub input: Vec<u8>,
    pub args: Vec<String>,
}

/// The transcode engine adapter; one instance per worker context
pub struct TranscodeEngine {
    backend: Arc<dyn EngineBackend>,
    fs: VirtualFs,
    state: Mutex<EngineState>,
    init_failure: Mutex<Option<String>>,
    version: Mutex<Option<String>>,
    load_lock: tokio::sync::Mutex<()>,
}

impl TranscodeEngine {
    pub fn new(backend: Arc<dyn EngineBackend>, work_dir: Option<&Path>) -> ClipperResult<Self> {
        Ok(Self {
            backend,
            fs: VirtualFs::new(work_dir)?,
            state: Mutex::new(EngineState::Unloaded),
            init_failure: Mutex::new(None),
            version: Mutex::new(None),
            load_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    pub fn version(&self) -> Option<String> {
        self.version
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn fs(&self) -> &VirtualFs {
        &self.fs
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, from: EngineState, to: EngineState) -> bool {
        let mut state = self.lock_state();
        if *state == from {
            debug!(%from, %to, "Engine state transition");
            *state = to;
            true
        } else {
            false
        }
    }

    /// Initialize the engine once. No-op when already loaded.
    ///
    /// A failed initialization is fatal: it is remembered and returned on every
    /// later call without trying again.
    pub async fn load(&self) -> ClipperResult<()> {
        let _guard = self.load_lock.lock().await;

        if let Some(message) = self
            .init_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
        {
            return Err(ClipperError::EngineInit { message });
        }
        if !self.transition(EngineState::Unloaded, EngineState::Loading) {
            return Ok(());
        }

        info!("Initializing transcode engine");
        match self.backend.initialize().await {
            Ok(version) => {
                info!(%version, "Transcode engine ready");
                *self
                    .version
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(version);
                self.transition(EngineState::Loading, EngineState::Ready);
                Ok(())
            }
            Err(err) => {
                let message = match err {
                    ClipperError::EngineInit { message } => message,
                    other => other.to_string(),
                };
                error!(%message, "Transcode engine failed to initialize");
                *self
                    .init_failure
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message.clone());
                self.transition(EngineState::Loading, EngineState::Unloaded);
                Err(ClipperError::EngineInit { message })
            }
        }
    }

    /// Run one job to completion.
    ///
    /// Every engine line is forwarded to `observer` (if any) before the run
    /// resolves. Fails with `ConcurrentJob` while another run is in flight.
    pub async fn run(
        &self,
        job: EngineJob,
        observer: Option<mpsc::UnboundedSender<String>>,
    ) -> ClipperResult<()> {
        {
            let mut state = self.lock_state();
            match *state {
                EngineState::Ready => *state = EngineState::Running,
                EngineState::Running => return Err(ClipperError::ConcurrentJob),
                other => {
                    return Err(ClipperError::EngineNotReady {
                        state: other.to_string(),
                    })
                }
            }
        }
        let guard = RunGuard { engine: self };

        let result = self.execute(job, observer).await;
        if let Err(err) = self.fs.unmount_input().await {
            warn!(error = %err, "Failed to unmount engine input");
        }
        guard.finish(result.is_ok());
        result
    }

    async fn execute(
        &self,
        job: EngineJob,
        observer: Option<mpsc::UnboundedSender<String>>,
    ) -> ClipperResult<()> {
        self.fs.mount_input(&job.input).await?;
        drop(job.input);

        let args = with_default_args(job.args);
        debug!(args = %args.join(" "), "Launching engine");

        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        let (signal, completion) = CompletionSignal::new();
        let diagnostics = Arc::new(Mutex::new(VecDeque::with_capacity(DIAGNOSTIC_LINES)));

        let pump = tokio::spawn(pump_lines(
            lines_rx,
            observer,
            signal.clone(),
            Arc::clone(&diagnostics),
        ));

        if let Err(err) = self.backend.launch(args, self.fs.root(), lines_tx).await {
            pump.abort();
            return Err(err);
        }

        let outcome = completion.await.unwrap_or(RunOutcome::Disconnected);
        let diagnostics: Vec<String> = diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();

        match outcome {
            RunOutcome::Exited(0) => {
                info!("Engine run completed");
                Ok(())
            }
            RunOutcome::Exited(code) => Err(ClipperError::EngineRun {
                message: format!("engine exited with code {code}"),
                diagnostics,
            }),
            RunOutcome::Disconnected => Err(ClipperError::EngineRun {
                message: "engine log stream closed before completion".to_string(),
                diagnostics,
            }),
        }
    }

    /// Bytes of a named output; `OutputNotFound` if the engine did not write it
    pub async fn read_output(&self, name: &str) -> ClipperResult<Vec<u8>> {
        self.fs.read_output(name).await
    }

    pub async fn output_exists(&self, name: &str) -> bool {
        self.fs.output_exists(name).await
    }
}

/// Returns the engine to `Ready` however the run ends
struct RunGuard<'a> {
    engine: &'a TranscodeEngine,
}

impl RunGuard<'_> {
    fn finish(self, succeeded: bool) {
        if !succeeded {
            self.engine
                .transition(EngineState::Running, EngineState::Failed);
        }
        // Drop performs the move back to Ready
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.engine.lock_state();
        let from = *state;
        if matches!(from, EngineState::Running | EngineState::Failed) {
            debug!(%from, to = %EngineState::Ready, "Engine state transition");
            *state = EngineState::Ready;
        }
    }
}

fn with_default_args(args: Vec<String>) -> Vec<String> {
    DEFAULT_ARGS
        .iter()
        .map(|arg| arg.to_string())
        .chain(args)
        .filter(|arg| !arg.is_empty())
        .collect()
}

async fn pump_lines(
    mut lines: mpsc::UnboundedReceiver<String>,
    observer: Option<mpsc::UnboundedSender<String>>,
    signal: CompletionSignal,
    diagnostics: Arc<Mutex<VecDeque<String>>>,
) {
    while let Some(line) = lines.recv().await {
        if let Some(code) = parse_sentinel(&line) {
            if !signal.resolve(RunOutcome::Exited(code)) {
                warn!(%line, "Ignoring repeated completion sentinel");
            }
            continue;
        }

        debug!(target: "clipstream::engine", "{line}");
        {
            let mut recent = diagnostics
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if recent.len() == DIAGNOSTIC_LINES {
                recent.pop_front();
            }
            recent.push_back(line.clone());
        }
        if let Some(observer) = &observer {
            let _ = observer.send(line);
        }
    }
    signal.resolve(RunOutcome::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::{ScriptedBackend, ScriptedRun};
    use std::time::Duration;

    fn engine(backend: ScriptedBackend) -> TranscodeEngine {
        TranscodeEngine::new(Arc::new(backend), None).unwrap()
    }

    fn job() -> EngineJob {
        EngineJob {
            input: b"source".to_vec(),
            args: vec!["-i".into(), INPUT_REF.into(), output_ref("out.mp4")],
        }
    }

    #[test]
    fn test_parse_sentinel() {
        assert_eq!(parse_sentinel("FFMPEG_END"), Some(0));
        assert_eq!(parse_sentinel("FFMPEG_END 1"), Some(1));
        assert_eq!(parse_sentinel("  FFMPEG_END  "), Some(0));
        assert_eq!(parse_sentinel("FFMPEG_ENDING"), None);
        assert_eq!(parse_sentinel("FFMPEG_END soon"), None);
        assert_eq!(parse_sentinel("frame=1 FFMPEG_END"), None);
    }

    #[test]
    fn test_completion_signal_resolves_once() {
        let (signal, mut rx) = CompletionSignal::new();
        assert!(signal.resolve(RunOutcome::Exited(0)));
        assert!(!signal.resolve(RunOutcome::Exited(1)));
        assert!(signal.is_resolved());
        assert_eq!(rx.try_recv().unwrap(), RunOutcome::Exited(0));
    }

    #[test]
    fn test_default_args_prefix_and_empty_args_dropped() {
        let args = with_default_args(vec!["".into(), "-i".into(), "x".into()]);
        assert_eq!(args, vec!["-nostdin", "-y", "-i", "x"]);
    }

    #[tokio::test]
    async fn test_run_requires_load() {
        let engine = engine(ScriptedBackend::new());
        match engine.run(job(), None).await {
            Err(ClipperError::EngineNotReady { state }) => assert_eq!(state, "unloaded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let backend = ScriptedBackend::new();
        let engine = engine(backend.clone());
        engine.load().await.unwrap();
        engine.load().await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(backend.initialize_calls(), 1);
        assert!(engine.version().is_some());
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal_and_not_retried() {
        let backend = ScriptedBackend::new().fail_initialize("wasm blob missing");
        let engine = engine(backend.clone());
        assert!(matches!(
            engine.load().await,
            Err(ClipperError::EngineInit { .. })
        ));
        assert!(matches!(
            engine.load().await,
            Err(ClipperError::EngineInit { .. })
        ));
        assert_eq!(backend.initialize_calls(), 1);
        assert_eq!(engine.state(), EngineState::Unloaded);
    }

    #[tokio::test]
    async fn test_successful_run_returns_to_ready_and_relays_lines() {
        let backend = ScriptedBackend::new().with_run(
            ScriptedRun::success()
                .line("Input #0, mov,mp4")
                .write_output("out.mp4", b"clip".to_vec()),
        );
        let engine = engine(backend.clone());
        engine.load().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.run(job(), Some(tx)).await.unwrap();

        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(rx.recv().await.as_deref(), Some("Input #0, mov,mp4"));
        assert_eq!(engine.read_output("out.mp4").await.unwrap(), b"clip");
        assert_eq!(
            &backend.launched_args()[0][..2],
            &["-nostdin".to_string(), "-y".to_string()]
        );
        // Input is not left behind for the next job
        assert!(!engine.fs().input_path().exists());
    }

    #[tokio::test]
    async fn test_failed_run_carries_diagnostics_and_recovers() {
        let backend = ScriptedBackend::new()
            .with_run(
                ScriptedRun::exit(1).line("moov atom not found").line("Invalid data found"),
            )
            .with_run(ScriptedRun::success().write_output("out.mp4", b"ok".to_vec()));
        let engine = engine(backend);
        engine.load().await.unwrap();

        match engine.run(job(), None).await {
            Err(ClipperError::EngineRun { diagnostics, .. }) => {
                assert_eq!(diagnostics, vec!["moov atom not found", "Invalid data found"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(engine.state(), EngineState::Ready);
        engine.run(job(), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_sentinel_is_a_run_failure() {
        let backend = ScriptedBackend::new().with_run(ScriptedRun::success().without_sentinel());
        let engine = engine(backend);
        engine.load().await.unwrap();
        assert!(matches!(
            engine.run(job(), None).await,
            Err(ClipperError::EngineRun { .. })
        ));
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_second_run_while_running_is_rejected() {
        let backend = ScriptedBackend::new()
            .with_run(ScriptedRun::success().delay(Duration::from_millis(200)));
        let engine = Arc::new(engine(backend));
        engine.load().await.unwrap();

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(job(), None).await })
        };
        while engine.state() != EngineState::Running {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            engine.run(job(), None).await,
            Err(ClipperError::ConcurrentJob)
        ));
        first.await.unwrap().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_missing_output_is_output_not_found() {
        let engine = engine(ScriptedBackend::new());
        assert!(matches!(
            engine.read_output("never.gif").await,
            Err(ClipperError::OutputNotFound { .. })
        ));
    }
}
