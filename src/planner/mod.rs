//! Job planning: filter graphs, engine invocations and output names

pub mod filter_graph;
pub mod invocation;
pub mod naming;

use serde::Serialize;

use crate::domain::model::ValidSpec;
use crate::error::ClipperResult;

pub use filter_graph::{FilterGraph, FilterGraphSynthesizer, FilterStage, GraphShape, StageKind};
pub use invocation::{EngineInvocation, InvocationBuilder};

/// Everything needed to run one clip job, computed without touching the engine
#[derive(Debug, Clone, Serialize)]
pub struct ClipPlan {
    pub graph: FilterGraph,
    pub invocation: EngineInvocation,
    /// Output name inside the engine filesystem
    pub output_name: String,
    /// Name offered to the user
    pub download_name: String,
    /// Expected media duration, used for progress
    pub expected_duration: f64,
}

impl ClipPlan {
    /// Plan a clip job; `input_ref` and `output_dir` are engine filesystem references
    pub fn new(spec: &ValidSpec, input_ref: &str, output_dir: &str) -> ClipperResult<Self> {
        let graph = filter_graph::synthesize(spec);
        let output_name = naming::output_name(spec);
        let output_ref = format!("{output_dir}/{output_name}");
        let invocation = invocation::build(&graph, spec, input_ref, &output_ref)?;
        Ok(Self {
            graph,
            invocation,
            output_name,
            download_name: naming::download_name(spec),
            expected_duration: spec.output_duration(),
        })
    }
}
