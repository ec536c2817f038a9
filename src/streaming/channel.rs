//! Worker-to-caller job channel
//!
//! One channel per job. `done` and `error` are terminal: after either has been
//! sent, the sender refuses further messages and the receiver stops yielding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ClipperError, JobFailure};

/// Finished output handed to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBlob {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Messages from the worker context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Log { text: String },
    Progress { text: String },
    Segment { index: u64, payload: Vec<u8> },
    /// Batch jobs carry their output; streaming jobs have already sent segments
    Done { output: Option<OutputBlob> },
    Error { detail: JobFailure },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Done { .. } | WorkerMessage::Error { .. })
    }
}

/// Sending half, shared by everything producing messages for one job
#[derive(Clone)]
pub struct JobChannel {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    closed: Arc<AtomicBool>,
}

/// Receiving half held by the caller
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
    finished: bool,
}

pub fn job_channel() -> (JobChannel, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        JobChannel {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        },
        JobReceiver {
            rx,
            finished: false,
        },
    )
}

impl JobChannel {
    /// Send a message; returns `false` once the channel is closed
    pub fn send(&self, message: WorkerMessage) -> bool {
        if message.is_terminal() {
            if self.closed.swap(true, Ordering::SeqCst) {
                warn!(?message, "Dropping terminal message on a closed job channel");
                return false;
            }
        } else if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(message).is_ok()
    }

    pub fn log(&self, text: impl Into<String>) -> bool {
        self.send(WorkerMessage::Log { text: text.into() })
    }

    pub fn progress(&self, text: impl Into<String>) -> bool {
        self.send(WorkerMessage::Progress { text: text.into() })
    }

    pub fn segment(&self, index: u64, payload: Vec<u8>) -> bool {
        self.send(WorkerMessage::Segment { index, payload })
    }

    pub fn done(&self, output: Option<OutputBlob>) -> bool {
        self.send(WorkerMessage::Done { output })
    }

    pub fn fail(&self, error: &ClipperError) -> bool {
        self.send(WorkerMessage::Error {
            detail: JobFailure::from(error),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl JobReceiver {
    /// Next message; `None` after the terminal message or if the worker vanished
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        if self.finished {
            return None;
        }
        let message = self.rx.recv().await;
        match &message {
            Some(message) if message.is_terminal() => self.finished = true,
            None => self.finished = true,
            Some(_) => {}
        }
        message
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
