//! Analysis configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on sampling rate; anything higher is treated as a client error.
pub const MAX_FRAME_RATE: f64 = 60.0;

/// Configuration errors detected before any work starts. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid frame rate: {0} (must be > 0 and <= 60)")]
    InvalidRate(f64),

    #[error("No active reference products")]
    EmptyProductSet,

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Duplicate product id: {0}")]
    DuplicateProductId(String),

    #[error("Invalid video reference: {0}")]
    InvalidVideoRef(String),
}

/// Matching threshold policy applied by the detection client.
///
/// Higher sensitivity requires a higher match confidence, trading recall
/// for fewer false positives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        }
    }

    /// Offset added to a product's minimum confidence.
    pub fn threshold_offset(&self) -> i16 {
        match self {
            Sensitivity::Low => -10,
            Sensitivity::Medium => 0,
            Sensitivity::High => 10,
        }
    }

    /// Effective threshold a match score must exceed, clamped to 0-100.
    pub fn effective_threshold(&self, min_confidence: u8) -> u8 {
        (min_confidence as i16 + self.threshold_offset()).clamp(0, 100) as u8
    }
}

/// Per-job analysis configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Samples per second (> 0)
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Matching threshold policy
    #[serde(default)]
    pub sensitivity: Sensitivity,

    /// Suppress repeated matches of a product in back-to-back samples
    #[serde(default = "default_skip_similar")]
    pub skip_similar: bool,
}

fn default_frame_rate() -> f64 {
    1.0
}

fn default_skip_similar() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            sensitivity: Sensitivity::default(),
            skip_similar: default_skip_similar(),
        }
    }
}

impl AnalysisConfig {
    /// Create a config with the given sampling rate and defaults otherwise.
    pub fn with_frame_rate(frame_rate: f64) -> Self {
        Self {
            frame_rate,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 || self.frame_rate > MAX_FRAME_RATE {
            return Err(ConfigError::InvalidRate(self.frame_rate));
        }
        Ok(())
    }

    /// Seconds between two sampled frames.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.frame_rate
    }

    /// Window within which a repeat detection of a product is suppressed.
    pub fn dedup_window(&self) -> f64 {
        self.frame_interval()
    }

    /// Maximum gap between detections that still forms one visible interval.
    pub fn merge_gap(&self) -> f64 {
        2.0 * self.frame_interval()
    }

    /// Number of frames a full sampling pass over `duration` seconds yields.
    ///
    /// Counts the indices `i` with `i / frame_rate < duration`, the same test
    /// the frame stream applies.
    pub fn expected_frames(&self, duration: f64) -> u64 {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if !usable(duration) || !usable(self.frame_rate) {
            return 0;
        }

        let mut count = (duration * self.frame_rate).ceil() as u64;
        while count > 0 && (count - 1) as f64 / self.frame_rate >= duration {
            count -= 1;
        }
        while (count as f64) / self.frame_rate < duration {
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_validation() {
        assert!(AnalysisConfig::with_frame_rate(2.0).validate().is_ok());
        assert!(matches!(
            AnalysisConfig::with_frame_rate(0.0).validate(),
            Err(ConfigError::InvalidRate(_))
        ));
        assert!(AnalysisConfig::with_frame_rate(-1.0).validate().is_err());
        assert!(AnalysisConfig::with_frame_rate(f64::NAN).validate().is_err());
        assert!(AnalysisConfig::with_frame_rate(120.0).validate().is_err());
    }

    #[test]
    fn test_derived_windows() {
        let config = AnalysisConfig::with_frame_rate(2.0);
        assert!((config.frame_interval() - 0.5).abs() < 1e-12);
        assert!((config.dedup_window() - 0.5).abs() < 1e-12);
        assert!((config.merge_gap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_expected_frames() {
        let config = AnalysisConfig::with_frame_rate(2.0);
        assert_eq!(config.expected_frames(10.0), 20);
        assert_eq!(config.expected_frames(10.2), 21);
        assert_eq!(config.expected_frames(0.0), 0);
    }

    #[test]
    fn test_expected_frames_ignores_float_overshoot() {
        // 8.3 * 30 evaluates to slightly above 249
        let config = AnalysisConfig::with_frame_rate(30.0);
        assert_eq!(config.expected_frames(8.3), 249);

        let config = AnalysisConfig::with_frame_rate(3.0);
        assert_eq!(config.expected_frames(0.1), 1);
        assert_eq!(config.expected_frames(1.0), 3);
    }

    #[test]
    fn test_sensitivity_threshold_policy() {
        assert_eq!(Sensitivity::Low.effective_threshold(85), 75);
        assert_eq!(Sensitivity::Medium.effective_threshold(85), 85);
        assert_eq!(Sensitivity::High.effective_threshold(85), 95);
        assert_eq!(Sensitivity::High.effective_threshold(95), 100);
        assert_eq!(Sensitivity::Low.effective_threshold(5), 0);
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"frameRate": 4}"#).unwrap();
        assert_eq!(config.sensitivity, Sensitivity::Medium);
        assert!(config.skip_similar);
        assert!((config.frame_rate - 4.0).abs() < 1e-12);
    }
}
