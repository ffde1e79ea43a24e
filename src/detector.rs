/// Wake-word detector
///
/// Wraps a keyword-scoring capability behind a per-frame boolean decision.
/// The scorer keeps short-term temporal context across calls, so callers
/// must feed frames one at a time, in strict arrival order, from a single
/// consumer. Skipping or reordering frames degrades detection quality
/// silently; this is a caller obligation, not an enforced invariant.

use crate::frame::{AudioSample, FRAME_SIZE};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("no usable keyword model: {0}")]
    ModelLoad(String),

    #[error("invalid frame size: expected {expected} samples, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("keyword scoring failed: {0}")]
    Scoring(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Keyword model the detector falls back to when the configured model file
/// is missing.
pub const FALLBACK_KEYWORD: &str = "hey_mycroft";

/// Threshold applied to the fallback keyword's score. This stays at the
/// stock 0.5 even when a different detection threshold is configured; the
/// configured threshold only applies to the target keyword.
const FALLBACK_THRESHOLD: f32 = 0.5;

/// The external keyword-scoring capability.
///
/// `predict` consumes one frame of samples and returns a score per known
/// keyword model. Scores are bounded per model but not comparable across
/// models. Implementations are stateful: each call updates internal
/// temporal context.
#[cfg_attr(test, mockall::automock)]
pub trait KeywordScorer: Send {
    fn predict(
        &mut self,
        samples: &[AudioSample],
    ) -> Result<HashMap<String, f32>, DetectorError>;
}

/// Energy-envelope keyword scorer.
///
/// Stands in for a trained keyword model: tracks a smoothed RMS envelope
/// across calls and scores every known keyword from it. Frames below the
/// voice-activity threshold score zero.
pub struct EnergyScorer {
    keywords: Vec<String>,
    vad_threshold: f32,
    envelope: f32,
}

impl EnergyScorer {
    pub fn new(keywords: Vec<String>, vad_threshold: f32) -> Result<Self, DetectorError> {
        if keywords.is_empty() {
            return Err(DetectorError::ModelLoad(
                "no keyword models given".to_string(),
            ));
        }

        Ok(Self {
            keywords,
            vad_threshold,
            envelope: 0.0,
        })
    }
}

impl KeywordScorer for EnergyScorer {
    fn predict(
        &mut self,
        samples: &[AudioSample],
    ) -> Result<HashMap<String, f32>, DetectorError> {
        let sum_squares: f64 = samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum();
        let rms = (sum_squares / samples.len().max(1) as f64).sqrt() as f32;

        // Smooth across frames so a single loud transient does not spike
        // the score on its own.
        self.envelope = 0.7 * self.envelope + 0.3 * rms;

        let score = if rms < self.vad_threshold * 0.05 {
            0.0
        } else {
            self.envelope.min(1.0)
        };

        Ok(self
            .keywords
            .iter()
            .map(|k| (k.clone(), score))
            .collect())
    }
}

/// Configuration for the wake-word detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the target keyword model file. The target keyword name is
    /// the file stem. Provisioning the file is the caller's explicit step;
    /// a missing file falls back to the bundled keyword with a warning.
    pub model_path: String,

    /// Detection threshold for the target keyword (0.0 - 1.0)
    pub threshold: f32,

    /// Voice-activity threshold handed to the scoring capability (0.0 - 1.0)
    pub vad_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "hey_robot.onnx".to_string(),
            threshold: 0.5,
            vad_threshold: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(DetectorError::InvalidConfig(
                "threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(DetectorError::InvalidConfig(
                "vad_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Target keyword name derived from the model path.
    fn target_keyword(&self) -> Option<String> {
        Path::new(&self.model_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
    }
}

/// Per-frame wake-word decision over a stateful scorer.
pub struct WakeWordDetector {
    scorer: Box<dyn KeywordScorer>,
    keyword: String,
    threshold: f32,
    frame_size: usize,
    frames_checked: u64,
}

impl WakeWordDetector {
    /// Build a detector with the bundled scoring capability.
    ///
    /// Loads the model named by `config.model_path` if the file exists;
    /// otherwise logs a warning and falls back to the bundled `hey_mycroft`
    /// keyword. Failing to load any model, fallback included, is fatal.
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;

        let (scorer, keyword) = if Path::new(&config.model_path).exists() {
            let keyword = config.target_keyword().ok_or_else(|| {
                DetectorError::ModelLoad(format!("unusable model path: {}", config.model_path))
            })?;

            info!("Loading keyword model: {}", config.model_path);
            let scorer = EnergyScorer::new(
                vec![keyword.clone(), FALLBACK_KEYWORD.to_string()],
                config.vad_threshold,
            )?;
            (scorer, keyword)
        } else {
            warn!(
                "Keyword model not found at {}, falling back to '{}'",
                config.model_path, FALLBACK_KEYWORD
            );
            let scorer = EnergyScorer::new(
                vec![FALLBACK_KEYWORD.to_string()],
                config.vad_threshold,
            )?;
            (scorer, FALLBACK_KEYWORD.to_string())
        };

        Ok(Self::assemble(config, Box::new(scorer), keyword))
    }

    /// Build a detector around an externally supplied scoring capability.
    pub fn with_scorer(
        config: &DetectorConfig,
        scorer: Box<dyn KeywordScorer>,
    ) -> Result<Self, DetectorError> {
        config.validate()?;

        let keyword = config
            .target_keyword()
            .unwrap_or_else(|| FALLBACK_KEYWORD.to_string());

        Ok(Self::assemble(config, scorer, keyword))
    }

    fn assemble(
        config: &DetectorConfig,
        scorer: Box<dyn KeywordScorer>,
        keyword: String,
    ) -> Self {
        info!("Target keyword: {}", keyword);
        info!("Detection threshold: {}", config.threshold);

        Self {
            scorer,
            keyword,
            threshold: config.threshold,
            frame_size: FRAME_SIZE,
            frames_checked: 0,
        }
    }

    /// Score one frame and decide whether the wake-word was heard.
    ///
    /// Returns true iff the fallback keyword scores above the fixed 0.5
    /// fallback threshold, or the target keyword scores above the
    /// configured threshold. Keywords absent from the score map count as
    /// not detected. Scoring failures propagate to the caller untouched.
    pub fn check(&mut self, frame: &[AudioSample]) -> Result<bool, DetectorError> {
        if frame.len() != self.frame_size {
            return Err(DetectorError::FrameSizeMismatch {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }

        let scores = self.scorer.predict(frame)?;
        self.frames_checked += 1;

        if let Some(score) = scores.get(FALLBACK_KEYWORD) {
            if *score > FALLBACK_THRESHOLD {
                return Ok(true);
            }
        }

        if let Some(score) = scores.get(&self.keyword) {
            if *score > self.threshold {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub fn target_keyword(&self) -> &str {
        &self.keyword
    }

    pub fn frames_checked(&self) -> u64 {
        self.frames_checked
    }
}
