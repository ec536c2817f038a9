// Domain errors - Error types for the domain layer

use std::fmt;

/// Why a clip specification was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Start/end missing, negative, non-finite or not strictly increasing
    InvalidTimeRange,
    /// Trimmed duration exceeds the ceiling for the output format
    DurationTooLong,
}

/// Clip specification validation failure
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn invalid_time_range(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::InvalidTimeRange,
            message: message.into(),
        }
    }

    pub fn duration_too_long(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::DurationTooLong,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValidationErrorKind::InvalidTimeRange => {
                write!(f, "Invalid time range: {}", self.message)
            }
            ValidationErrorKind::DurationTooLong => {
                write!(f, "Duration too long: {}", self.message)
            }
        }
    }
}

impl std::error::Error for ValidationError {}
