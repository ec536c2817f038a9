// TOML config adapter - Typed configuration loaded from TOML files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClipperError, ClipperResult};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "clipstream.toml";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClipperConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub gifsicle_path: PathBuf,
    /// Segment discovery interval
    pub poll_interval_ms: u64,
    /// Live preview segment length
    pub segment_seconds: f64,
    /// Live preview scale cap
    pub preview_max_width: u32,
    /// Parent of the engine working directory; system temp when unset
    pub work_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ClipperConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            gifsicle_path: PathBuf::from("gifsicle"),
            poll_interval_ms: 200,
            segment_seconds: 1.0,
            preview_max_width: 1280,
            work_dir: None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ClipperConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> ClipperResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ClipperError::Config {
            message: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ClipperResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ClipperError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ClipperResult<String> {
        toml::to_string_pretty(self).map_err(|e| ClipperError::Config {
            message: format!("failed to serialize config: {e}"),
        })
    }

    /// Apply one `key = value` override given as text (environment, CLI)
    pub fn set(&mut self, key: &str, value: &str) -> ClipperResult<()> {
        let invalid = |what: &str| ClipperError::Config {
            message: format!("invalid {key} '{value}': {what}"),
        };
        match key {
            "ffmpeg_path" => self.ffmpeg_path = PathBuf::from(value),
            "ffprobe_path" => self.ffprobe_path = PathBuf::from(value),
            "gifsicle_path" => self.gifsicle_path = PathBuf::from(value),
            "poll_interval_ms" => {
                self.poll_interval_ms = value.parse().map_err(|_| invalid("expected milliseconds"))?
            }
            "segment_seconds" => {
                self.segment_seconds = value.parse().map_err(|_| invalid("expected seconds"))?
            }
            "preview_max_width" => {
                self.preview_max_width = value.parse().map_err(|_| invalid("expected pixels"))?
            }
            "work_dir" => self.work_dir = Some(PathBuf::from(value)),
            "log_level" => self.log_level = value.to_string(),
            "log_format" => self.log_format = value.to_string(),
            _ => {
                return Err(ClipperError::Config {
                    message: format!("unknown configuration key '{key}'"),
                })
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> ClipperResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ClipperError::Config {
                message: "poll_interval_ms must be positive".to_string(),
            });
        }
        if !(self.segment_seconds.is_finite() && self.segment_seconds > 0.0) {
            return Err(ClipperError::Config {
                message: format!("segment_seconds must be positive, got {}", self.segment_seconds),
            });
        }
        if self.preview_max_width < 2 {
            return Err(ClipperError::Config {
                message: format!("preview_max_width too small: {}", self.preview_max_width),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ClipperConfig::from_toml_str("poll_interval_ms = 50\nffmpeg_path = \"/opt/ffmpeg\"")
            .unwrap();
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(config.segment_seconds, 1.0);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ClipperConfig::from_toml_str("threads = 4").is_err());
        assert!(ClipperConfig::default().set("threads", "4").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ClipperConfig::default();
        assert!(config.set("poll_interval_ms", "0").is_err());
        assert!(config.set("segment_seconds", "soon").is_err());
        assert!(ClipperConfig::from_toml_str("segment_seconds = -1.0").is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut config = ClipperConfig::default();
        config.set("work_dir", "/tmp/clips").unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(ClipperConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "preview_max_width = 640").unwrap();
        assert_eq!(ClipperConfig::load(&path).unwrap().preview_max_width, 640);
        assert!(ClipperConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
