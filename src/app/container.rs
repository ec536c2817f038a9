use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{ClipperConfig, FFmpegBackend, FileSourceAdapter, GifsicleOptimizer};
use crate::app::{
    clip_interactor::ClipInteractor,
    preview_interactor::{PreviewInteractor, PreviewSettings},
    worker::{EngineWorker, WorkerSettings},
};
use crate::engine::TranscodeEngine;
use crate::error::ClipperResult;
use crate::ports::{EngineBackend, OptimizerPort, SourcePort};

pub trait AppContainer: Send + Sync {
    fn clip_interactor(&self) -> Arc<ClipInteractor>;
    fn preview_interactor(&self) -> Arc<PreviewInteractor>;
    fn worker(&self) -> EngineWorker;
}

pub struct DefaultAppContainer {
    clip_interactor: Arc<ClipInteractor>,
    preview_interactor: Arc<PreviewInteractor>,
    worker: EngineWorker,
}

impl DefaultAppContainer {
    /// Wire the process-backed adapters. Must be called inside a tokio runtime.
    pub fn new(config: &ClipperConfig) -> ClipperResult<Self> {
        config.validate()?;
        let backend = Arc::new(FFmpegBackend::new(&config.ffmpeg_path));
        let source = Arc::new(FileSourceAdapter::new(&config.ffprobe_path));
        let optimizer = Arc::new(GifsicleOptimizer::new(&config.gifsicle_path));

        Self::with_ports(
            config,
            backend as Arc<dyn EngineBackend>,
            source as Arc<dyn SourcePort>,
            optimizer as Arc<dyn OptimizerPort>,
        )
    }

    /// Wire arbitrary ports, e.g. a scripted engine in tests
    pub fn with_ports(
        config: &ClipperConfig,
        backend: Arc<dyn EngineBackend>,
        source: Arc<dyn SourcePort>,
        optimizer: Arc<dyn OptimizerPort>,
    ) -> ClipperResult<Self> {
        let engine = TranscodeEngine::new(backend, config.work_dir.as_deref())?;
        let worker = EngineWorker::spawn(
            engine,
            WorkerSettings {
                poll_interval: Duration::from_millis(config.poll_interval_ms),
            },
        );

        let clip_interactor = Arc::new(ClipInteractor::new(
            Arc::clone(&source),
            optimizer,
            worker.clone(),
        ));

        let preview_interactor = Arc::new(PreviewInteractor::new(
            source,
            worker.clone(),
            PreviewSettings {
                segment_seconds: config.segment_seconds,
                max_width: config.preview_max_width,
            },
        ));

        Ok(Self {
            clip_interactor,
            preview_interactor,
            worker,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn clip_interactor(&self) -> Arc<ClipInteractor> {
        Arc::clone(&self.clip_interactor)
    }

    fn preview_interactor(&self) -> Arc<PreviewInteractor> {
        Arc::clone(&self.preview_interactor)
    }

    fn worker(&self) -> EngineWorker {
        self.worker.clone()
    }
}
