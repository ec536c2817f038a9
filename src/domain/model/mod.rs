// Domain models - Clip specification and media types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::error::ClipperError;

/// Time specification with precision - represents time in seconds with fractional precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Parse time string: seconds (`12.5`), `MM:SS.ms` or `HH:MM:SS.ms`
    pub fn parse(time_str: &str) -> Result<Self, ValidationError> {
        let trimmed = time_str.trim();

        if let Ok(seconds) = trimmed.parse::<f64>() {
            if seconds < 0.0 || !seconds.is_finite() {
                return Err(ValidationError::invalid_time_range(format!(
                    "time cannot be negative: {trimmed}"
                )));
            }
            return Ok(Self::from_seconds(seconds));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let bad = |what: &str| {
            ValidationError::invalid_time_range(format!("invalid {what} in '{trimmed}'"))
        };
        let (hours, minutes, seconds) = match parts.as_slice() {
            [m, s] => (
                0u32,
                m.parse::<u32>().map_err(|_| bad("minutes"))?,
                s.parse::<f64>().map_err(|_| bad("seconds"))?,
            ),
            [h, m, s] => {
                let minutes = m.parse::<u32>().map_err(|_| bad("minutes"))?;
                if minutes >= 60 {
                    return Err(bad("minutes"));
                }
                (
                    h.parse::<u32>().map_err(|_| bad("hours"))?,
                    minutes,
                    s.parse::<f64>().map_err(|_| bad("seconds"))?,
                )
            }
            _ => {
                return Err(ValidationError::invalid_time_range(format!(
                    "unsupported time format '{trimmed}' (use seconds, MM:SS.ms or HH:MM:SS.ms)"
                )))
            }
        };
        if !(0.0..60.0).contains(&seconds) {
            return Err(bad("seconds"));
        }

        Ok(Self::from_seconds(
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds,
        ))
    }

    /// Format as H:MM:SS.mmm or M:SS.mmm
    pub fn format_hms(&self) -> String {
        let total_ms = (self.seconds * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms / 60_000) % 60;
        let seconds = (total_ms / 1000) % 60;
        let milliseconds = total_ms % 1000;

        if hours > 0 {
            format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, milliseconds)
        } else {
            format!("{}:{:02}.{:03}", minutes, seconds, milliseconds)
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Broad category of an output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

/// Output container / image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Webp,
    Flv,
    Mov,
    Mp3,
    Wav,
    Gif,
    Png,
    Jpg,
    Apng,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 10] = [
        OutputFormat::Mp4,
        OutputFormat::Webp,
        OutputFormat::Flv,
        OutputFormat::Mov,
        OutputFormat::Mp3,
        OutputFormat::Wav,
        OutputFormat::Gif,
        OutputFormat::Png,
        OutputFormat::Jpg,
        OutputFormat::Apng,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webp => "webp",
            OutputFormat::Flv => "flv",
            OutputFormat::Mov => "mov",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::Gif => "gif",
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Apng => "apng",
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            OutputFormat::Mp4 | OutputFormat::Webp | OutputFormat::Flv | OutputFormat::Mov => {
                MediaKind::Video
            }
            OutputFormat::Mp3 | OutputFormat::Wav => MediaKind::Audio,
            OutputFormat::Gif | OutputFormat::Png | OutputFormat::Jpg | OutputFormat::Apng => {
                MediaKind::Image
            }
        }
    }

    /// Extension of the downloaded file
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Apng => "png",
            other => other.name(),
        }
    }

    /// Extension the engine writes; selects the muxer
    pub fn engine_extension(&self) -> &'static str {
        self.name()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webp => "video/webp",
            OutputFormat::Flv => "video/flv",
            OutputFormat::Mov => "video/mov",
            OutputFormat::Mp3 => "audio/mp3",
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Png => "image/png",
            OutputFormat::Jpg => "image/jpg",
            OutputFormat::Apng => "image/apng",
        }
    }

    pub fn is_audio_only(&self) -> bool {
        self.kind() == MediaKind::Audio
    }

    /// Single-frame formats; end trimming does not apply
    pub fn is_still_image(&self) -> bool {
        matches!(self, OutputFormat::Png | OutputFormat::Jpg)
    }

    /// Palette-indexed animated formats
    pub fn is_palette_indexed(&self) -> bool {
        matches!(self, OutputFormat::Gif | OutputFormat::Apng)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = ClipperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = if wanted == "jpeg" { "jpg".to_string() } else { wanted };
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.name() == wanted)
            .ok_or_else(|| ClipperError::UnsupportedFormat {
                format: s.to_string(),
            })
    }
}

/// Trim window in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Crop rectangle expressed as fractions of the decoded source dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Covers the whole frame
    pub fn full_frame() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Non-negative origin and positive extent, all finite
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Extends past the right or bottom edge of the source
    pub fn exceeds_frame(&self) -> bool {
        self.x + self.width > 1.0 || self.y + self.height > 1.0
    }

    /// Convert a pixel rectangle into fractions of the given source size
    pub fn from_pixels(x: u32, y: u32, width: u32, height: u32, source: (u32, u32)) -> Self {
        let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
        Self::new(
            x as f64 / sw,
            y as f64 / sh,
            width as f64 / sw,
            height as f64 / sh,
        )
    }
}

/// Behaviour toggles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFlags {
    #[serde(default)]
    pub boomerang: bool,
    #[serde(default)]
    pub fadeout: bool,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    #[serde(default)]
    pub optimize_output: bool,
}

/// One conversion request, as assembled from user input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpecification {
    /// Opaque reference to the source bytes
    pub source_handle: String,
    pub title: String,
    pub time_range: TimeRange,
    #[serde(default)]
    pub crop: Option<CropRect>,
    pub scale_factor: f64,
    /// 0 inherits the source frame rate
    #[serde(default)]
    pub target_fps: f64,
    pub speed_factor: f64,
    #[serde(default)]
    pub flags: ClipFlags,
    pub output_format: OutputFormat,
    #[serde(default)]
    pub output_filename_override: Option<String>,
}

impl ClipSpecification {
    /// Specification with neutral transform parameters
    pub fn new(
        source_handle: impl Into<String>,
        title: impl Into<String>,
        time_range: TimeRange,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            source_handle: source_handle.into(),
            title: title.into(),
            time_range,
            crop: None,
            scale_factor: 1.0,
            target_fps: 0.0,
            speed_factor: 1.0,
            flags: ClipFlags::default(),
            output_format,
            output_filename_override: None,
        }
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_scale(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_fps(mut self, target_fps: f64) -> Self {
        self.target_fps = target_fps;
        self
    }

    pub fn with_speed(mut self, speed_factor: f64) -> Self {
        self.speed_factor = speed_factor;
        self
    }

    pub fn with_flags(mut self, flags: ClipFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.output_filename_override = Some(filename.into());
        self
    }
}

/// Validated, normalized and immutable clip specification.
///
/// Only produced by [`crate::domain::rules::validate`]. Permissive fallbacks are
/// already applied: an invalid crop becomes `None`, a non-positive speed disables
/// the speed stage, a non-positive fps is unset.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSpec {
    spec: ClipSpecification,
    crop: Option<CropRect>,
    speed: Option<f64>,
    fps: Option<f64>,
    scale: f64,
}

impl ValidSpec {
    pub(crate) fn new(
        spec: ClipSpecification,
        crop: Option<CropRect>,
        speed: Option<f64>,
        fps: Option<f64>,
        scale: f64,
    ) -> Self {
        Self {
            spec,
            crop,
            speed,
            fps,
            scale,
        }
    }

    pub fn specification(&self) -> &ClipSpecification {
        &self.spec
    }

    pub fn format(&self) -> OutputFormat {
        self.spec.output_format
    }

    pub fn time_range(&self) -> TimeRange {
        self.spec.time_range
    }

    pub fn flags(&self) -> ClipFlags {
        self.spec.flags
    }

    pub fn title(&self) -> &str {
        &self.spec.title
    }

    pub fn source_handle(&self) -> &str {
        &self.spec.source_handle
    }

    pub fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Duration of the produced media, after speed change and boomerang
    pub fn output_duration(&self) -> f64 {
        let trimmed = self.time_range().duration();
        let sped = match self.speed {
            Some(speed) => trimmed / speed,
            None => trimmed,
        };
        if self.flags().boomerang {
            sped * 2.0
        } else {
            sped
        }
    }
}
