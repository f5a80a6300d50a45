//! Video source references and probed metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::config::ConfigError;

/// Location of a video to analyse: a local path or an http(s) URL.
///
/// Opaque to everything except the frame sampler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoRef(pub String);

impl VideoRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this reference is a remote URL rather than a local path.
    pub fn is_remote(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Syntactic validation only; existence is checked when the source opens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidVideoRef("video reference is empty".into()));
        }
        if trimmed.contains("://") && !self.is_remote() {
            return Err(ConfigError::InvalidVideoRef(format!(
                "unsupported scheme in '{}'",
                trimmed
            )));
        }
        Ok(())
    }

    /// Title derived from the reference when the container carries none.
    pub fn fallback_title(&self) -> String {
        let without_query = self.0.split(['?', '#']).next().unwrap_or_default();
        Path::new(without_query)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "Untitled video".to_string())
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VideoRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VideoRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Metadata read from the source before sampling starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            title: title.into(),
            duration_seconds,
            width: None,
            height: None,
        }
    }
}
