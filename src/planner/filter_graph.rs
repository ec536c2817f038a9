//! Filter graph synthesis: clip specification to ordered ffmpeg filter stages

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::model::{CropRect, ValidSpec};

/// Length of the tail crossfade, in seconds
pub const FADE_LENGTH: f64 = 0.12;

/// Output pad name of a complex graph
pub const OUTPUT_PAD: &str = "[v]";

const PALETTE_GEN: &str =
    "palettegen=reserve_transparent=on:transparency_color=ffffff:stats_mode=diff";
const PALETTE_USE: &str = "paletteuse=dither=sierra2:diff_mode=rectangle";

/// Stage kinds in their fixed pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Crop,
    Speed,
    Fps,
    Scale,
    Boomerang,
    Fadeout,
    Palette,
}

/// One semantic filter operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum FilterStage {
    /// Crop as fractions of the decoded input size
    Crop(CropRect),
    /// Presentation timestamp rescale by `1 / factor`
    Speed { factor: f64 },
    Fps { fps: f64 },
    /// Width as a fraction of input width, even height preserving aspect
    Scale { factor: f64 },
    /// Forward copy followed by a reversed copy
    Boomerang,
    /// Crossfade of the tail into the head
    Fadeout { fade: f64, total_duration: f64 },
    /// Palette generation and application for indexed-color output
    Palette,
}

impl FilterStage {
    pub fn kind(&self) -> StageKind {
        match self {
            FilterStage::Crop(_) => StageKind::Crop,
            FilterStage::Speed { .. } => StageKind::Speed,
            FilterStage::Fps { .. } => StageKind::Fps,
            FilterStage::Scale { .. } => StageKind::Scale,
            FilterStage::Boomerang => StageKind::Boomerang,
            FilterStage::Fadeout { .. } => StageKind::Fadeout,
            FilterStage::Palette => StageKind::Palette,
        }
    }

    /// Needs labeled pads, i.e. a complex graph
    pub fn is_branching(&self) -> bool {
        matches!(
            self,
            FilterStage::Boomerang | FilterStage::Fadeout { .. } | FilterStage::Palette
        )
    }

    /// Render the stage as ffmpeg filter syntax
    pub fn render(&self) -> String {
        match self {
            FilterStage::Crop(crop) => format!(
                "crop={}*in_w:{}*in_h:{}*in_w:{}*in_h",
                round2(crop.width),
                round2(crop.height),
                round2(crop.x),
                round2(crop.y)
            ),
            FilterStage::Speed { factor } => format!("setpts={}*PTS", 1.0 / factor),
            FilterStage::Fps { fps } => format!("fps={fps}"),
            FilterStage::Scale { factor } => format!("scale={factor}*in_w:-2:flags=lanczos"),
            FilterStage::Boomerang => {
                "split=2[begin][mid];[mid]reverse[r];[begin][r]concat=n=2:v=1:a=0".to_string()
            }
            FilterStage::Fadeout {
                fade,
                total_duration,
            } => {
                let offset = (total_duration - 2.0 * fade).max(0.0);
                format!(
                    "split=2[normal][fade];\
                     [normal]trim=start={fade},setpts=PTS-STARTPTS[start];\
                     [fade]trim=duration={fade},setpts=PTS-STARTPTS[end];\
                     [start][end]xfade=transition=fade:duration={fade}:offset={offset}"
                )
            }
            FilterStage::Palette => {
                format!("split[s0][s1];[s0]{PALETTE_GEN}[p];[s1][p]{PALETTE_USE}")
            }
        }
    }
}

/// How the stages compose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphShape {
    /// Flat comma-separated chain, passed with `-vf`
    Chain,
    /// Labeled graph with a single output pad, passed with `-filter_complex`
    Complex,
}

/// Rendered filter directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpression {
    Simple(String),
    Complex { graph: String, output_pad: String },
}

/// Ordered filter stages for one clip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterGraph {
    stages: Vec<FilterStage>,
}

impl FilterGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(FilterStage::kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|stage| stage.kind() == kind)
    }

    pub fn shape(&self) -> GraphShape {
        if self.stages.iter().any(FilterStage::is_branching) {
            GraphShape::Complex
        } else {
            GraphShape::Chain
        }
    }

    /// Render to a single filter directive; `None` for an empty graph
    pub fn render(&self) -> Option<FilterExpression> {
        if self.is_empty() {
            return None;
        }

        let chain: Vec<String> = self
            .stages
            .iter()
            .filter(|stage| !stage.is_branching())
            .map(FilterStage::render)
            .collect();

        match self.shape() {
            GraphShape::Chain => Some(FilterExpression::Simple(chain.join(","))),
            GraphShape::Complex => {
                let mut parts = chain;
                parts.extend(
                    self.stages
                        .iter()
                        .filter(|stage| stage.is_branching())
                        .map(FilterStage::render),
                );
                Some(FilterExpression::Complex {
                    graph: format!("[0:v]{}{}", parts.join(","), OUTPUT_PAD),
                    output_pad: OUTPUT_PAD.to_string(),
                })
            }
        }
    }
}

/// Filter graph synthesizer
pub struct FilterGraphSynthesizer;

impl FilterGraphSynthesizer {
    /// Build the filter graph for a validated specification.
    ///
    /// Stage order is fixed: crop, speed, fps, scale, boomerang, fadeout, palette.
    /// Audio-only outputs get an empty graph.
    pub fn synthesize(spec: &ValidSpec) -> FilterGraph {
        let format = spec.format();
        if format.is_audio_only() {
            debug!(%format, "Audio-only output, no video filters");
            return FilterGraph::empty();
        }

        let mut stages = Vec::new();

        if let Some(crop) = spec.crop() {
            stages.push(FilterStage::Crop(crop));
        }
        if let Some(factor) = spec.speed() {
            stages.push(FilterStage::Speed { factor });
        }
        if let Some(fps) = spec.fps() {
            stages.push(FilterStage::Fps { fps });
        }
        stages.push(FilterStage::Scale {
            factor: spec.scale(),
        });

        let flags = spec.flags();
        if flags.boomerang {
            stages.push(FilterStage::Boomerang);
        }
        if flags.fadeout {
            stages.push(FilterStage::Fadeout {
                fade: FADE_LENGTH,
                total_duration: spec.output_duration(),
            });
        }
        if format.is_palette_indexed() {
            stages.push(FilterStage::Palette);
        }

        let graph = FilterGraph { stages };
        debug!(kinds = ?graph.kinds(), shape = ?graph.shape(), "Synthesized filter graph");
        graph
    }
}

/// Synthesize the filter graph; see [`FilterGraphSynthesizer::synthesize`]
pub fn synthesize(spec: &ValidSpec) -> FilterGraph {
    FilterGraphSynthesizer::synthesize(spec)
}

/// Output size after crop and scale, height snapped to the nearest even value.
///
/// Mirrors the engine's `-2` height rule so callers can report dimensions
/// before the job runs.
pub fn output_dimensions(source: (u32, u32), crop: Option<CropRect>, scale: f64) -> (u32, u32) {
    let crop = crop.unwrap_or_else(CropRect::full_frame);
    let cropped_w = source.0 as f64 * round2(crop.width);
    let cropped_h = source.1 as f64 * round2(crop.height);
    let width = (cropped_w * scale).trunc().max(1.0);
    if cropped_w <= 0.0 {
        return (width as u32, 2);
    }
    let height = ((width * cropped_h / cropped_w) / 2.0).round() * 2.0;
    (width as u32, height.max(2.0) as u32)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::*;
    use crate::domain::rules::validate;
    use proptest::prelude::*;

    fn valid(spec: ClipSpecification) -> ValidSpec {
        validate(spec).unwrap()
    }

    fn base(format: OutputFormat) -> ClipSpecification {
        ClipSpecification::new("file:a.mp4", "a", TimeRange::new(10.0, 15.0), format)
    }

    #[test]
    fn plain_video_is_a_scale_chain() {
        let graph = synthesize(&valid(base(OutputFormat::Mp4)));
        assert_eq!(graph.shape(), GraphShape::Chain);
        assert_eq!(graph.kinds(), vec![StageKind::Speed, StageKind::Scale]);
        assert_eq!(
            graph.render(),
            Some(FilterExpression::Simple(
                "setpts=1*PTS,scale=1*in_w:-2:flags=lanczos".to_string()
            ))
        );
    }

    #[test]
    fn audio_only_ignores_visual_options() {
        for format in [OutputFormat::Mp3, OutputFormat::Wav] {
            let spec = base(format)
                .with_crop(CropRect::new(0.1, 0.1, 0.5, 0.5))
                .with_scale(0.5)
                .with_flags(ClipFlags {
                    boomerang: true,
                    fadeout: true,
                    ..ClipFlags::default()
                });
            let graph = synthesize(&valid(spec));
            assert!(graph.is_empty());
            assert_eq!(graph.render(), None);
        }
    }

    #[test]
    fn crop_is_fractional_and_rounded() {
        let spec = base(OutputFormat::Mp4).with_crop(CropRect::new(0.123, 0.456, 0.5, 0.333));
        let graph = synthesize(&valid(spec));
        assert_eq!(
            graph.stages()[0].render(),
            "crop=0.5*in_w:0.33*in_h:0.12*in_w:0.46*in_h"
        );
    }

    #[test]
    fn speed_is_inverse_timescale() {
        let graph = synthesize(&valid(base(OutputFormat::Mp4).with_speed(2.0)));
        assert_eq!(graph.stages()[0].render(), "setpts=0.5*PTS");
    }

    #[test]
    fn boomerang_fadeout_gif_is_complex_in_order() {
        let spec = base(OutputFormat::Gif).with_flags(ClipFlags {
            boomerang: true,
            fadeout: true,
            ..ClipFlags::default()
        });
        let graph = synthesize(&valid(spec));
        assert_eq!(graph.shape(), GraphShape::Complex);

        let Some(FilterExpression::Complex { graph, output_pad }) = graph.render() else {
            panic!("expected a complex graph");
        };
        assert_eq!(output_pad, "[v]");
        assert!(graph.starts_with("[0:v]"));
        assert!(graph.ends_with("[v]"));

        let split = graph.find("split=2[begin][mid]").unwrap();
        let reverse = graph.find("reverse[r]").unwrap();
        let concat = graph.find("concat=n=2:v=1:a=0").unwrap();
        let xfade = graph.find("xfade=transition=fade").unwrap();
        let palettegen = graph.find("palettegen").unwrap();
        let paletteuse = graph.find("paletteuse").unwrap();
        assert!(split < reverse && reverse < concat);
        assert!(concat < xfade);
        assert!(xfade < palettegen && palettegen < paletteuse);
    }

    #[test]
    fn fadeout_offset_uses_output_duration() {
        // 5s clip doubled by boomerang: 10s, offset 10 - 0.24
        let spec = base(OutputFormat::Mp4).with_flags(ClipFlags {
            boomerang: true,
            fadeout: true,
            ..ClipFlags::default()
        });
        let graph = synthesize(&valid(spec));
        let fade = graph
            .stages()
            .iter()
            .find(|stage| stage.kind() == StageKind::Fadeout)
            .unwrap();
        assert!(fade.render().ends_with("offset=9.76"));
    }

    #[test]
    fn apng_gets_palette_stage() {
        let graph = synthesize(&valid(base(OutputFormat::Apng)));
        assert_eq!(graph.kinds().last(), Some(&StageKind::Palette));
        assert_eq!(graph.shape(), GraphShape::Complex);
    }

    #[test]
    fn output_dimensions_are_even() {
        assert_eq!(output_dimensions((1920, 1080), None, 0.5), (960, 540));
        assert_eq!(output_dimensions((1000, 563), None, 1.0), (1000, 564));
        assert_eq!(
            output_dimensions((1920, 1080), Some(CropRect::new(0.0, 0.0, 0.5, 0.5)), 1.0),
            (960, 540)
        );
    }

    fn format_strategy() -> impl Strategy<Value = OutputFormat> {
        proptest::sample::select(OutputFormat::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn stage_order_is_fixed(
            format in format_strategy(),
            start in 0.0f64..30.0,
            len in 0.1f64..30.0,
            crop in proptest::option::of((0.0f64..0.5, 0.0f64..0.5, -0.2f64..0.5, 0.01f64..0.5)),
            speed in -1.0f64..4.0,
            fps in 0.0f64..60.0,
            boomerang in any::<bool>(),
            fadeout in any::<bool>(),
        ) {
            let mut spec = base(format);
            spec.time_range = TimeRange::new(start, start + len);
            spec.crop = crop.map(|(x, y, w, h)| CropRect::new(x, y, w, h));
            spec.speed_factor = speed;
            spec.target_fps = fps;
            spec.flags = ClipFlags { boomerang, fadeout, ..ClipFlags::default() };

            let graph = synthesize(&valid(spec));
            let kinds = graph.kinds();
            prop_assert!(kinds.windows(2).all(|pair| pair[0] < pair[1]));
            if format.is_audio_only() {
                prop_assert!(kinds.is_empty());
            } else {
                prop_assert!(kinds.contains(&StageKind::Scale));
                prop_assert_eq!(
                    graph.shape() == GraphShape::Complex,
                    boomerang || fadeout || format.is_palette_indexed()
                );
            }
        }
    }
}
