//! Error handling module for Clipstream

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::errors::ValidationError;

/// Main error type for Clipstream operations
#[derive(Error, Debug)]
pub enum ClipperError {
    /// Clip specification rejected before any engine work
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Output format not known to the argument builder
    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    /// A second job was started while one is running
    #[error("The engine can only run one job at a time")]
    ConcurrentJob,

    /// Engine used before `load()` completed
    #[error("Engine is not ready (state: {state})")]
    EngineNotReady { state: String },

    /// Engine initialization failed; no transcoding is possible afterwards
    #[error("Processing unavailable: engine failed to start: {message}")]
    EngineInit { message: String },

    /// The engine reported a failure while running a job
    #[error("Engine run failed: {message}{}", format_diagnostics(.diagnostics))]
    EngineRun {
        message: String,
        diagnostics: Vec<String>,
    },

    /// Named output missing from the engine's filesystem
    #[error("Engine output not found: {name}")]
    OutputNotFound { name: String },

    /// Source acquisition failed
    #[error("Source unavailable: {reference}: {message}")]
    SourceUnavailable { reference: String, message: String },

    /// Post-processing optimizer failed
    #[error("Optimizer failed: {message}")]
    Optimizer { message: String },

    /// The delivery channel closed before a terminal message arrived
    #[error("Job channel closed before completion")]
    ChannelClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_diagnostics(diagnostics: &[String]) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!("\n{}", diagnostics.join("\n"))
    }
}

/// Result type alias for Clipstream operations
pub type ClipperResult<T> = std::result::Result<T, ClipperError>;

/// Failure category carried across the worker boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConcurrentJob,
    EngineNotReady,
    EngineInit,
    EngineRun,
    OutputNotFound,
    Io,
}

/// Serializable form of an asynchronous job failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl From<&ClipperError> for JobFailure {
    fn from(error: &ClipperError) -> Self {
        let (kind, message, diagnostics) = match error {
            ClipperError::ConcurrentJob => (FailureKind::ConcurrentJob, String::new(), Vec::new()),
            ClipperError::EngineNotReady { state } => {
                (FailureKind::EngineNotReady, state.clone(), Vec::new())
            }
            ClipperError::EngineInit { message } => {
                (FailureKind::EngineInit, message.clone(), Vec::new())
            }
            ClipperError::EngineRun {
                message,
                diagnostics,
            } => (FailureKind::EngineRun, message.clone(), diagnostics.clone()),
            ClipperError::OutputNotFound { name } => {
                (FailureKind::OutputNotFound, name.clone(), Vec::new())
            }
            other => (FailureKind::Io, other.to_string(), Vec::new()),
        };
        Self {
            kind,
            message,
            diagnostics,
        }
    }
}

impl From<JobFailure> for ClipperError {
    fn from(failure: JobFailure) -> Self {
        match failure.kind {
            FailureKind::ConcurrentJob => ClipperError::ConcurrentJob,
            FailureKind::EngineNotReady => ClipperError::EngineNotReady {
                state: failure.message,
            },
            FailureKind::EngineInit => ClipperError::EngineInit {
                message: failure.message,
            },
            FailureKind::EngineRun => ClipperError::EngineRun {
                message: failure.message,
                diagnostics: failure.diagnostics,
            },
            FailureKind::OutputNotFound => ClipperError::OutputNotFound {
                name: failure.message,
            },
            FailureKind::Io => ClipperError::Io(std::io::Error::other(failure.message)),
        }
    }
}
