// Application layer - Use case interactors and the engine worker

pub mod clip_interactor;
pub mod container;
pub mod message_log;
pub mod preview_interactor;
pub mod worker;

// Re-export interactors
pub use clip_interactor::{ClipInteractor, ClipOutcome};
pub use message_log::MessageLog;
pub use preview_interactor::{PreviewInteractor, PreviewSettings};
pub use worker::{EngineWorker, JobState, WorkerJob};
