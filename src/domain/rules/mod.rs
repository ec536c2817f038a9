// Domain rules - Clip specification validation and normalization

use tracing::warn;

use crate::domain::errors::ValidationError;
use crate::domain::model::*;

/// Longest gif, in seconds of trimmed source
pub const GIF_MAX_DURATION: f64 = 60.0;

/// Business rules for accepting a clip specification
pub struct ClipValidator;

impl ClipValidator {
    /// Validate and normalize a specification.
    ///
    /// Checks run in a fixed order: time range, gif duration ceiling, crop, speed.
    /// Only the first two can reject; crop, speed, fps and scale fall back to
    /// neutral values instead of failing.
    pub fn validate(spec: ClipSpecification) -> Result<ValidSpec, ValidationError> {
        Self::check_time_range(&spec.time_range)?;
        Self::check_duration_ceiling(&spec)?;

        let crop = Self::normalize_crop(spec.crop);
        let speed = Self::normalize_speed(spec.speed_factor);
        let fps = (spec.target_fps.is_finite() && spec.target_fps > 0.0).then_some(spec.target_fps);
        let scale = Self::normalize_scale(spec.scale_factor);

        Ok(ValidSpec::new(spec, crop, speed, fps, scale))
    }

    fn check_time_range(range: &TimeRange) -> Result<(), ValidationError> {
        if !range.start.is_finite() || !range.end.is_finite() {
            return Err(ValidationError::invalid_time_range(format!(
                "start/end must be numbers (start={}, end={})",
                range.start, range.end
            )));
        }
        if range.start < 0.0 {
            return Err(ValidationError::invalid_time_range(format!(
                "start ({}) cannot be negative",
                range.start
            )));
        }
        if range.duration() <= 0.0 {
            return Err(ValidationError::invalid_time_range(format!(
                "start ({}) must be less than end ({})",
                range.start, range.end
            )));
        }
        Ok(())
    }

    fn check_duration_ceiling(spec: &ClipSpecification) -> Result<(), ValidationError> {
        let duration = spec.time_range.duration();
        if spec.output_format == OutputFormat::Gif && duration > GIF_MAX_DURATION {
            return Err(ValidationError::duration_too_long(format!(
                "gif clips are limited to {GIF_MAX_DURATION}s, got {duration}s"
            )));
        }
        Ok(())
    }

    fn normalize_crop(crop: Option<CropRect>) -> Option<CropRect> {
        let crop = crop?;
        if !crop.is_valid() {
            warn!(?crop, "Ignoring invalid crop rectangle, using full frame");
            return None;
        }
        if crop.exceeds_frame() {
            // Passed through unclamped; the engine decides.
            warn!(?crop, "Crop rectangle extends past the source frame");
        }
        Some(crop)
    }

    fn normalize_speed(speed: f64) -> Option<f64> {
        if speed.is_finite() && speed > 0.0 {
            Some(speed)
        } else {
            warn!(speed, "Non-positive speed factor, speed stage disabled");
            None
        }
    }

    fn normalize_scale(scale: f64) -> f64 {
        if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            warn!(scale, "Invalid scale factor, falling back to 1");
            1.0
        }
    }
}

/// Validate a clip specification; see [`ClipValidator::validate`]
pub fn validate(spec: ClipSpecification) -> Result<ValidSpec, ValidationError> {
    ClipValidator::validate(spec)
}
