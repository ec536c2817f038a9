//! Command-line argument definitions

use std::path::{Path, PathBuf};

use clap::Args;

use crate::domain::model::{
    ClipFlags, ClipSpecification, CropRect, OutputFormat, TimeRange, TimeSpec,
};
use crate::error::{ClipperError, ClipperResult};

/// Clip parameters shared by `clip` and `plan`
#[derive(Args, Debug, Clone)]
pub struct SpecArgs {
    /// Input media file
    #[arg(short, long)]
    pub input: String,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub start: String,

    /// End time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub end: String,

    /// Output format (gif, apng, mp4, webp, flv, mov, mp3, wav, png, jpg)
    #[arg(short, long, default_value = "gif")]
    pub format: String,

    /// Crop rectangle as frame fractions: x,y,width,height
    #[arg(long, value_delimiter = ',', num_args = 4, allow_negative_numbers = true)]
    pub crop: Option<Vec<f64>>,

    /// Scale factor applied after cropping
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Output frame rate (0 keeps the source rate)
    #[arg(long, default_value_t = 0.0)]
    pub fps: f64,

    /// Playback speed factor
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Play forward then backward
    #[arg(long)]
    pub boomerang: bool,

    /// Crossfade the end of the clip briefly into its start
    #[arg(long)]
    pub fadeout: bool,

    /// Loop animated images forever
    #[arg(long = "loop")]
    pub looping: bool,

    /// Run the gif optimizer on the result
    #[arg(long)]
    pub optimize: bool,

    /// Clip title (default: input file stem)
    #[arg(long)]
    pub title: Option<String>,

    /// Download file name without extension
    #[arg(long)]
    pub filename: Option<String>,
}

impl SpecArgs {
    pub fn to_specification(&self) -> ClipperResult<ClipSpecification> {
        let start = TimeSpec::parse(&self.start)?;
        let end = TimeSpec::parse(&self.end)?;
        let format: OutputFormat = self.format.parse()?;
        let title = self.title.clone().unwrap_or_else(|| {
            Path::new(&self.input)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "clip".to_string())
        });

        let mut spec = ClipSpecification::new(
            self.input.clone(),
            title,
            TimeRange::new(start.seconds, end.seconds),
            format,
        )
        .with_scale(self.scale)
        .with_fps(self.fps)
        .with_speed(self.speed)
        .with_flags(ClipFlags {
            boomerang: self.boomerang,
            fadeout: self.fadeout,
            looping: self.looping,
            optimize_output: self.optimize,
        });

        if let Some(crop) = &self.crop {
            match crop.as_slice() {
                [x, y, width, height] => {
                    spec = spec.with_crop(CropRect::new(*x, *y, *width, *height));
                }
                _ => {
                    return Err(ClipperError::Config {
                        message: "--crop takes exactly four values".to_string(),
                    })
                }
            }
        }
        if let Some(filename) = &self.filename {
            spec = spec.with_filename(filename.clone());
        }
        Ok(spec)
    }
}

/// Arguments for the clip command
#[derive(Args, Debug)]
pub struct ClipArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Directory the clip is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub spec: SpecArgs,
}

/// Arguments for the preview command
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Input media file
    #[arg(short, long)]
    pub input: String,

    /// Playback file the segments are appended to
    #[arg(short, long)]
    pub output: PathBuf,

    /// Segment length in seconds
    #[arg(long)]
    pub segment_seconds: Option<f64>,

    /// Maximum preview width
    #[arg(long)]
    pub max_width: Option<u32>,
}

/// Arguments for the normalize command
#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Input media file
    #[arg(short, long)]
    pub input: String,

    /// Directory the mp4 is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,
}
