//! Engine invocation building
//!
//! Argument order is fixed: seek/trim, input binding, filter directive,
//! format-specific options, output path. Seeking before `-i` is the fast,
//! keyframe-approximate form.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::model::{OutputFormat, ValidSpec};
use crate::error::{ClipperError, ClipperResult};
use crate::planner::filter_graph::{FilterExpression, FilterGraph};

/// Codec used when mp4 output is re-encoded
pub const MP4_VIDEO_CODEC: &str = "libx264";

/// Fragmented-MP4 flags for segments that can be appended to a playback buffer
pub const SEGMENT_MOVFLAGS: &str = "movflags=frag_keyframe+empty_moov+default_base_moof";

/// Ordered arguments for one engine run (without the engine's own defaults)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInvocation {
    args: Vec<String>,
    output: String,
}

impl EngineInvocation {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Output reference the engine writes (file or segment pattern)
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }

    /// Value following `flag`, if present
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }

    pub fn contains_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }
}

impl std::fmt::Display for EngineInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Builds engine argument lists
pub struct InvocationBuilder;

impl InvocationBuilder {
    /// Build the invocation for a clip job
    pub fn build(
        graph: &FilterGraph,
        spec: &ValidSpec,
        input_ref: &str,
        output_ref: &str,
    ) -> ClipperResult<EngineInvocation> {
        let format = spec.format();
        let range = spec.time_range();
        let mut args: Vec<String> = Vec::new();

        args.push("-ss".into());
        args.push(range.start.to_string());
        if !format.is_still_image() {
            args.push("-to".into());
            args.push(range.end.to_string());
        }

        args.push("-i".into());
        args.push(input_ref.to_string());

        if !format.is_audio_only() {
            match graph.render() {
                Some(FilterExpression::Simple(chain)) => {
                    args.push("-vf".into());
                    args.push(chain);
                }
                Some(FilterExpression::Complex { graph, output_pad }) => {
                    args.push("-filter_complex".into());
                    args.push(graph);
                    args.push("-map".into());
                    args.push(output_pad);
                }
                None => {}
            }
        }

        args.extend(Self::format_options(format, spec.flags().looping));
        args.push(output_ref.to_string());

        debug!(%format, args = %args.join(" "), "Built engine invocation");
        Ok(EngineInvocation {
            args,
            output: output_ref.to_string(),
        })
    }

    /// Build from a format name coming from outside the typed model
    pub fn build_for_format_name(
        graph: &FilterGraph,
        spec: &ValidSpec,
        format_name: &str,
        input_ref: &str,
        output_ref: &str,
    ) -> ClipperResult<EngineInvocation> {
        let format: OutputFormat = format_name.parse()?;
        if format != spec.format() {
            return Err(ClipperError::UnsupportedFormat {
                format: format!("{format_name} (specification targets {})", spec.format()),
            });
        }
        Self::build(graph, spec, input_ref, output_ref)
    }

    fn format_options(format: OutputFormat, looping: bool) -> Vec<String> {
        let options: Vec<&str> = match format {
            OutputFormat::Apng if looping => vec!["-dpi", "256", "-plays", "0"],
            OutputFormat::Apng => vec!["-dpi", "256"],
            OutputFormat::Png | OutputFormat::Jpg => vec!["-vframes", "1"],
            OutputFormat::Mp4 => vec!["-c:v", MP4_VIDEO_CODEC],
            OutputFormat::Gif
            | OutputFormat::Webp
            | OutputFormat::Flv
            | OutputFormat::Mov
            | OutputFormat::Mp3
            | OutputFormat::Wav => Vec::new(),
        };
        options.into_iter().map(String::from).collect()
    }

    /// Segmented fragmented-MP4 transcode of the whole source for live preview
    pub fn build_preview(
        input_ref: &str,
        segment_pattern: &str,
        segment_seconds: f64,
        max_width: u32,
    ) -> EngineInvocation {
        let args: Vec<String> = vec![
            "-i".into(),
            input_ref.to_string(),
            "-segment_format_options".into(),
            SEGMENT_MOVFLAGS.into(),
            "-segment_time".into(),
            segment_seconds.to_string(),
            "-vf".into(),
            format!("scale='min(in_w,{max_width})':-2"),
            "-f".into(),
            "segment".into(),
            segment_pattern.to_string(),
        ];
        EngineInvocation {
            args,
            output: segment_pattern.to_string(),
        }
    }

    /// Plain re-encode of the source into a browser-friendly mp4
    pub fn build_normalize(input_ref: &str, output_ref: &str) -> EngineInvocation {
        EngineInvocation {
            args: vec!["-i".into(), input_ref.to_string(), output_ref.to_string()],
            output: output_ref.to_string(),
        }
    }
}

/// Build the clip invocation; see [`InvocationBuilder::build`]
pub fn build(
    graph: &FilterGraph,
    spec: &ValidSpec,
    input_ref: &str,
    output_ref: &str,
) -> ClipperResult<EngineInvocation> {
    InvocationBuilder::build(graph, spec, input_ref, output_ref)
}
