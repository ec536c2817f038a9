//! Command implementations

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::FilePlaybackSink;
use crate::app::container::AppContainer;
use crate::app::ClipOutcome;
use crate::cli::args::{ClipArgs, NormalizeArgs, PlanArgs, PreviewArgs};
use crate::domain::rules::validate;
use crate::engine::{INPUT_REF, OUTPUT_DIR};
use crate::planner::ClipPlan;
use crate::streaming::WorkerMessage;
use crate::utils::format_file_size;

/// Execute the plan command
pub fn plan(args: PlanArgs) -> Result<()> {
    let spec = args.spec.to_specification()?;
    let valid = validate(spec).context("Clip specification rejected")?;
    let plan = ClipPlan::new(&valid, INPUT_REF, OUTPUT_DIR)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Execute the clip command
pub async fn clip(container: &dyn AppContainer, args: ClipArgs) -> Result<()> {
    let spec = args.spec.to_specification()?;
    info!(input = %spec.source_handle, format = %spec.output_format, "Starting clip operation");

    let outcome = container
        .clip_interactor()
        .execute_with(spec, report_progress)
        .await
        .context("Clip failed")?;

    write_outcome(&outcome, &args.output_dir).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

/// Execute the normalize command
pub async fn normalize(container: &dyn AppContainer, args: NormalizeArgs) -> Result<()> {
    info!(input = %args.input, "Starting normalize operation");
    let outcome = container
        .clip_interactor()
        .normalize(&args.input)
        .await
        .context("Normalize failed")?;
    write_outcome(&outcome, &args.output_dir).await
}

/// Execute the preview command
pub async fn preview(container: &dyn AppContainer, args: PreviewArgs) -> Result<()> {
    let sink = FilePlaybackSink::create(&args.output)
        .await
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let (report, _sink, _log) = container
        .preview_interactor()
        .execute(&args.input, sink, report_progress)
        .await
        .context("Preview failed")?;

    info!(
        segments = report.appended,
        duration = report.duration,
        output = %args.output.display(),
        "Preview written"
    );
    Ok(())
}

fn report_progress(message: &WorkerMessage) {
    if let WorkerMessage::Progress { text } = message {
        info!("{text}");
    }
}

async fn write_outcome(outcome: &ClipOutcome, output_dir: &Path) -> Result<()> {
    for warning in &outcome.warnings {
        warn!("{warning}");
    }
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Cannot create {}", output_dir.display()))?;
    let path = output_dir.join(&outcome.file_name);
    tokio::fs::write(&path, &outcome.bytes)
        .await
        .with_context(|| format!("Cannot write {}", path.display()))?;
    info!(
        path = %path.display(),
        size = %format_file_size(outcome.size as u64),
        "Clip written"
    );
    Ok(())
}
