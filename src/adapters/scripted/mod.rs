//! Scripted in-process engine backend
//!
//! Replays canned runs: log lines, output files, pauses, then the completion
//! sentinel. Lets the pipeline run without an ffmpeg binary.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::{COMPLETION_SENTINEL, INPUT_REF, OUTPUT_DIR};
use crate::error::{ClipperError, ClipperResult};
use crate::ports::EngineBackend;

#[derive(Debug, Clone)]
enum Step {
    Line(String),
    Write { name: String, bytes: Vec<u8> },
    Sleep(Duration),
}

/// One canned engine run
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    steps: Vec<Step>,
    exit_code: i32,
    sentinel: bool,
}

impl ScriptedRun {
    pub fn success() -> Self {
        Self::exit(0)
    }

    pub fn exit(code: i32) -> Self {
        Self {
            steps: Vec::new(),
            exit_code: code,
            sentinel: true,
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Line(line.into()));
        self
    }

    /// Write a file into the output directory
    pub fn write_output(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.steps.push(Step::Write {
            name: name.into(),
            bytes,
        });
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Close the log stream without announcing completion
    pub fn without_sentinel(mut self) -> Self {
        self.sentinel = false;
        self
    }

    /// Segmented output `0.mp4 .. count-1.mp4`, one every `interval`
    pub fn segments(mut self, count: usize, interval: Duration) -> Self {
        for index in 0..count {
            self = self
                .delay(interval)
                .write_output(format!("{index}.mp4"), format!("segment-{index}").into_bytes());
        }
        self
    }
}

#[derive(Default)]
struct ScriptState {
    runs: VecDeque<ScriptedRun>,
    init_failure: Option<String>,
    initialize_calls: usize,
    launched: Vec<Vec<String>>,
    inputs: Vec<Vec<u8>>,
}

/// Engine backend replaying [`ScriptedRun`]s in order
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a run; unqueued launches succeed without output
    pub fn with_run(self, run: ScriptedRun) -> Self {
        self.lock().runs.push_back(run);
        self
    }

    pub fn fail_initialize(self, message: impl Into<String>) -> Self {
        self.lock().init_failure = Some(message.into());
        self
    }

    pub fn initialize_calls(&self) -> usize {
        self.lock().initialize_calls
    }

    /// Argument lists of every launch so far
    pub fn launched_args(&self) -> Vec<Vec<String>> {
        self.lock().launched.clone()
    }

    /// Input bytes mounted at each launch
    pub fn launched_inputs(&self) -> Vec<Vec<u8>> {
        self.lock().inputs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EngineBackend for ScriptedBackend {
    async fn initialize(&self) -> ClipperResult<String> {
        let mut state = self.lock();
        state.initialize_calls += 1;
        match &state.init_failure {
            Some(message) => Err(ClipperError::EngineInit {
                message: message.clone(),
            }),
            None => Ok("scripted".to_string()),
        }
    }

    async fn launch(
        &self,
        args: Vec<String>,
        workdir: &Path,
        lines: mpsc::UnboundedSender<String>,
    ) -> ClipperResult<()> {
        let input = tokio::fs::read(workdir.join(INPUT_REF)).await?;
        let run = {
            let mut state = self.lock();
            state.launched.push(args);
            state.inputs.push(input);
            state.runs.pop_front().unwrap_or_else(ScriptedRun::success)
        };
        let output_dir = workdir.join(OUTPUT_DIR);

        tokio::spawn(async move {
            for step in run.steps {
                match step {
                    Step::Line(line) => {
                        let _ = lines.send(line);
                    }
                    Step::Write { name, bytes } => {
                        if let Err(err) = tokio::fs::write(output_dir.join(&name), bytes).await {
                            let _ = lines.send(format!("{name}: {err}"));
                        }
                    }
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                }
            }
            if run.sentinel {
                let line = if run.exit_code == 0 {
                    COMPLETION_SENTINEL.to_string()
                } else {
                    format!("{COMPLETION_SENTINEL} {}", run.exit_code)
                };
                let _ = lines.send(line);
            }
            debug!(exit_code = run.exit_code, "Scripted run finished");
        });
        Ok(())
    }
}
