// Clip interactor - Orchestrates the batch clip and normalize use cases

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::message_log::MessageLog;
use crate::app::worker::{BatchJob, EngineWorker, WorkerJob};
use crate::domain::model::{ClipSpecification, OutputFormat};
use crate::domain::rules::validate;
use crate::engine::progress::ProgressPhase;
use crate::engine::{output_ref, INPUT_REF, OUTPUT_DIR};
use crate::error::{ClipperError, ClipperResult};
use crate::planner::filter_graph::output_dimensions;
use crate::planner::{ClipPlan, InvocationBuilder};
use crate::ports::{OptimizerPort, SourcePort};
use crate::streaming::{JobReceiver, OutputBlob, WorkerMessage};

/// Output name of a normalize job
pub const NORMALIZED_OUTPUT: &str = "output.mp4";

/// Result of a finished clip job
#[derive(Debug, Clone, Serialize)]
pub struct ClipOutcome {
    pub file_name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size: usize,
    /// Output size when the source dimensions are known
    pub dimensions: Option<(u32, u32)>,
    pub optimized: bool,
    /// Non-fatal problems, e.g. a failed optimizer
    pub warnings: Vec<String>,
    pub log: MessageLog,
}

/// Interactor for clip jobs
pub struct ClipInteractor {
    source: Arc<dyn SourcePort>,
    optimizer: Arc<dyn OptimizerPort>,
    worker: EngineWorker,
}

impl ClipInteractor {
    pub fn new(
        source: Arc<dyn SourcePort>,
        optimizer: Arc<dyn OptimizerPort>,
        worker: EngineWorker,
    ) -> Self {
        Self {
            source,
            optimizer,
            worker,
        }
    }

    /// Validate, plan and run one clip job
    pub async fn execute(&self, spec: ClipSpecification) -> ClipperResult<ClipOutcome> {
        self.execute_with(spec, |_| {}).await
    }

    /// Like [`execute`](Self::execute), reporting log and progress messages as they arrive
    pub async fn execute_with<F>(
        &self,
        spec: ClipSpecification,
        on_message: F,
    ) -> ClipperResult<ClipOutcome>
    where
        F: FnMut(&WorkerMessage) + Send,
    {
        // Validation and planning fail before anything reaches the worker
        let valid = validate(spec)?;
        let plan = ClipPlan::new(&valid, INPUT_REF, OUTPUT_DIR)?;
        info!(
            format = %valid.format(),
            output = %plan.output_name,
            "Planned clip job"
        );

        let source = self.source.acquire(valid.source_handle()).await?;
        let dimensions = (source.probed_width > 0 && source.probed_height > 0)
            .then(|| {
                output_dimensions(
                    (source.probed_width, source.probed_height),
                    valid.crop(),
                    valid.scale(),
                )
            })
            .filter(|_| !valid.format().is_audio_only());

        let format = valid.format();
        let receiver = self.worker.submit(WorkerJob::Batch(BatchJob {
            input: source.bytes,
            args: plan.invocation.into_args(),
            output_name: plan.output_name,
            file_name: plan.download_name,
            mime_type: format.mime_type().to_string(),
            expected_duration: plan.expected_duration,
            reuse_output: true,
        }));

        let mut log = MessageLog::new();
        let blob = await_output(receiver, &mut log, on_message).await?;

        let mut outcome = ClipOutcome {
            file_name: blob.file_name,
            mime_type: blob.mime_type,
            size: blob.bytes.len(),
            bytes: blob.bytes,
            dimensions,
            optimized: false,
            warnings: Vec::new(),
            log,
        };

        if format == OutputFormat::Gif && valid.flags().optimize_output {
            self.optimize(&mut outcome).await;
        }
        Ok(outcome)
    }

    async fn optimize(&self, outcome: &mut ClipOutcome) {
        outcome.log.push(ProgressPhase::Optimizing.message());
        match self.optimizer.optimize(&outcome.bytes).await {
            Ok(optimized) => {
                outcome.size = optimized.len();
                outcome.bytes = optimized;
                outcome.optimized = true;
            }
            Err(err) => {
                // The unoptimized gif stays valid
                warn!(error = %err, "Keeping unoptimized gif");
                outcome.warnings.push(err.to_string());
            }
        }
    }

    /// Re-encode a source into a plain mp4
    pub async fn normalize(&self, reference: &str) -> ClipperResult<ClipOutcome> {
        let source = self.source.acquire(reference).await?;
        let invocation =
            InvocationBuilder::build_normalize(INPUT_REF, &output_ref(NORMALIZED_OUTPUT));
        let receiver = self.worker.submit(WorkerJob::Batch(BatchJob {
            input: source.bytes,
            args: invocation.into_args(),
            output_name: NORMALIZED_OUTPUT.to_string(),
            file_name: format!("{}.mp4", crate::planner::naming::sanitize_title(&source.title)),
            mime_type: OutputFormat::Mp4.mime_type().to_string(),
            expected_duration: 0.0,
            // Every source shares the same output name
            reuse_output: false,
        }));

        let mut log = MessageLog::new();
        let blob = await_output(receiver, &mut log, |_| {}).await?;
        Ok(ClipOutcome {
            file_name: blob.file_name,
            mime_type: blob.mime_type,
            size: blob.bytes.len(),
            bytes: blob.bytes,
            dimensions: (source.probed_width > 0)
                .then_some((source.probed_width, source.probed_height)),
            optimized: false,
            warnings: Vec::new(),
            log,
        })
    }
}

/// Wait for the terminal message of a batch job
async fn await_output<F>(
    mut receiver: JobReceiver,
    log: &mut MessageLog,
    mut on_message: F,
) -> ClipperResult<OutputBlob>
where
    F: FnMut(&WorkerMessage) + Send,
{
    loop {
        match receiver.recv().await {
            Some(WorkerMessage::Done { output }) => {
                return output.ok_or_else(|| ClipperError::OutputNotFound {
                    name: "batch output".to_string(),
                });
            }
            Some(WorkerMessage::Error { detail }) => return Err(detail.into()),
            Some(WorkerMessage::Segment { index, .. }) => {
                warn!(index, "Unexpected segment on a batch job");
            }
            Some(message) => {
                log.record(&message);
                on_message(&message);
            }
            None => return Err(ClipperError::ChannelClosed),
        }
    }
}
