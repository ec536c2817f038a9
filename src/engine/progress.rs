//! Progress reporting: job phases and engine `time=` parsing

use serde::{Deserialize, Serialize};

/// Job phases reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Initializing,
    Loading,
    Running,
    Optimizing,
    Done,
}

impl ProgressPhase {
    pub fn message(&self) -> &'static str {
        match self {
            ProgressPhase::Initializing => "Initializing engine",
            ProgressPhase::Loading => "Loading video data",
            ProgressPhase::Running => "Running engine",
            ProgressPhase::Optimizing => "Optimizing gif",
            ProgressPhase::Done => "Done",
        }
    }
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Extract the `time=HH:MM:SS.xx` position from an engine status line, in seconds
pub fn parse_time_position(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let value = line[start..].split_whitespace().next()?;
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then_some(total)
}

/// Turns engine status lines into whole-percent progress against an expected duration
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    expected_duration: f64,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    pub fn new(expected_duration: f64) -> Self {
        Self {
            expected_duration,
            last_percent: None,
        }
    }

    /// New percentage if `line` moves progress forward
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if self.expected_duration.is_nan() || self.expected_duration <= 0.0 {
            return None;
        }
        let position = parse_time_position(line)?;
        let percent = ((position / self.expected_duration) * 100.0).clamp(0.0, 100.0) as u8;
        match self.last_percent {
            Some(last) if percent <= last => None,
            _ => {
                self.last_percent = Some(percent);
                Some(percent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str =
        "frame=  120 fps=60 q=28.0 size=     256kB time=00:00:02.50 bitrate= 838.9kbits/s speed=2x";

    #[test]
    fn test_parse_time_position() {
        assert_eq!(parse_time_position(STATUS), Some(2.5));
        assert_eq!(parse_time_position("time=01:02:03.00"), Some(3723.0));
        assert_eq!(parse_time_position("time=N/A bitrate=N/A"), None);
        assert_eq!(parse_time_position("Input #0, mov,mp4"), None);
    }

    #[test]
    fn test_tracker_only_moves_forward() {
        let mut tracker = ProgressTracker::new(5.0);
        assert_eq!(tracker.observe(STATUS), Some(50));
        assert_eq!(tracker.observe(STATUS), None);
        assert_eq!(tracker.observe("time=00:00:01.00"), None);
        assert_eq!(tracker.observe("time=00:00:09.00"), Some(100));
    }

    #[test]
    fn test_tracker_without_duration_is_silent() {
        let mut tracker = ProgressTracker::new(0.0);
        assert_eq!(tracker.observe(STATUS), None);
    }

    #[test]
    fn test_phase_messages() {
        assert_eq!(ProgressPhase::Loading.to_string(), "Loading video data");
        assert_eq!(ProgressPhase::Done.message(), "Done");
    }
}
