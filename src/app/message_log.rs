// Message log - Timestamped record of what the worker reported for one job

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::streaming::WorkerMessage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub text: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.at.to_rfc3339(), self.text)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
    last_progress: Option<String>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>) -> &LogEntry {
        self.entries.push(LogEntry {
            at: Utc::now(),
            text: text.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Record log and progress messages; others are ignored
    pub fn record(&mut self, message: &WorkerMessage) -> Option<&LogEntry> {
        match message {
            WorkerMessage::Log { text } => Some(self.push(text.clone())),
            WorkerMessage::Progress { text } => {
                self.last_progress = Some(text.clone());
                Some(self.push(text.clone()))
            }
            _ => None,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last_progress(&self) -> Option<&str> {
        self.last_progress.as_deref()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_timestamped() {
        let mut log = MessageLog::new();
        log.record(&WorkerMessage::Progress {
            text: "Running engine".to_string(),
        });
        log.record(&WorkerMessage::Done { output: None });

        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.last_progress(), Some("Running engine"));
        let line = &log.lines()[0];
        assert!(line.ends_with(" - Running engine"));
        assert!(DateTime::parse_from_rfc3339(line.split(" - ").next().unwrap()).is_ok());
    }
}
