/// Listener configuration
///
/// Loaded from an optional JSON file, then overridden by environment
/// variables. Invalid values are errors at load time, never silent
/// defaults.

use crate::detector::DetectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub detector: DetectorConfig,

    /// Seconds of audio history kept in the ring buffer
    pub capacity_seconds: usize,

    /// Directory for WAV dumps of detection context, if any
    pub save_audio_dir: Option<PathBuf>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            capacity_seconds: 2,
            save_audio_dir: None,
        }
    }
}

impl ListenConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply environment variable overrides on top of this configuration.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = std::env::var("WAKEWORD_MODEL_PATH") {
            self.detector.model_path = v;
        }

        if let Ok(v) = std::env::var("WAKEWORD_THRESHOLD") {
            self.detector.threshold = parse_env("WAKEWORD_THRESHOLD", &v)?;
        }

        if let Ok(v) = std::env::var("WAKEWORD_VAD_THRESHOLD") {
            self.detector.vad_threshold = parse_env("WAKEWORD_VAD_THRESHOLD", &v)?;
        }

        if let Ok(v) = std::env::var("WAKEWORD_CAPACITY_SECONDS") {
            self.capacity_seconds = parse_env("WAKEWORD_CAPACITY_SECONDS", &v)?;
        }

        if let Ok(v) = std::env::var("WAKEWORD_SAVE_DIR") {
            self.save_audio_dir = Some(PathBuf::from(v));
        }

        Ok(self)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListenConfig::default();
        assert_eq!(config.capacity_seconds, 2);
        assert_eq!(config.detector.threshold, 0.5);
        assert!(config.save_audio_dir.is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listen.json");
        std::fs::write(
            &path,
            r#"{
                "detector": { "model_path": "models/hey_robot.onnx", "threshold": 0.7 },
                "capacity_seconds": 3
            }"#,
        )
        .unwrap();

        let config = ListenConfig::from_file(&path).unwrap();
        assert_eq!(config.detector.model_path, "models/hey_robot.onnx");
        assert_eq!(config.detector.threshold, 0.7);
        // Unset fields keep their defaults
        assert_eq!(config.detector.vad_threshold, 0.5);
        assert_eq!(config.capacity_seconds, 3);
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listen.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ListenConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ListenConfig::from_file(&dir.path().join("absent.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        // Single test mutates the process environment to avoid races with
        // parallel tests over the same variables.
        std::env::set_var("WAKEWORD_MODEL_PATH", "models/other.onnx");
        std::env::set_var("WAKEWORD_THRESHOLD", "0.8");
        std::env::set_var("WAKEWORD_CAPACITY_SECONDS", "5");
        std::env::set_var("WAKEWORD_SAVE_DIR", "/tmp/wake");

        let config = ListenConfig::default().apply_env().unwrap();
        assert_eq!(config.detector.model_path, "models/other.onnx");
        assert_eq!(config.detector.threshold, 0.8);
        assert_eq!(config.capacity_seconds, 5);
        assert_eq!(config.save_audio_dir, Some(PathBuf::from("/tmp/wake")));

        std::env::set_var("WAKEWORD_THRESHOLD", "not-a-number");
        let result = ListenConfig::default().apply_env();
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));

        for key in [
            "WAKEWORD_MODEL_PATH",
            "WAKEWORD_THRESHOLD",
            "WAKEWORD_CAPACITY_SECONDS",
            "WAKEWORD_SAVE_DIR",
        ] {
            std::env::remove_var(key);
        }
    }
}
