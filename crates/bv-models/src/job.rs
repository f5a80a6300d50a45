//! Analysis job identifiers, lifecycle states and status snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Analysis job lifecycle.
///
/// `Queued → Sampling → Detecting → Aggregating → Completed | Degraded`,
/// with a direct edge to `Failed` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job accepted, not started
    #[default]
    Queued,
    /// Opening the video source
    Sampling,
    /// Frames are flowing through the detection client
    Detecting,
    /// Deduplicating, merging intervals and building the report
    Aggregating,
    /// Finished with full frame coverage
    Completed,
    /// Finished, but too many frames were dropped; result is partial
    Degraded,
    /// Unrecoverable error or cancellation
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Sampling => "sampling",
            JobState::Detecting => "detecting",
            JobState::Aggregating => "aggregating",
            JobState::Completed => "completed",
            JobState::Degraded => "degraded",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Degraded | JobState::Failed)
    }

    /// Whether a result can be read in this state.
    pub fn has_result(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Degraded)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Queued, Sampling) => true,
            (Sampling, Detecting) => true,
            (Detecting, Aggregating) => true,
            (Aggregating, Completed) | (Aggregating, Degraded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureReason {
    InvalidRate,
    EmptyProductSet,
    SourceUnavailable(String),
    Cancelled,
    TimedOut,
    Internal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InvalidRate => write!(f, "invalid frame rate"),
            FailureReason::EmptyProductSet => write!(f, "no active reference products"),
            FailureReason::SourceUnavailable(msg) => write!(f, "video source unavailable: {}", msg),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::TimedOut => write!(f, "timed out before any frame was analysed"),
            FailureReason::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

/// Read-only snapshot returned by status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    /// Progress percentage (0-100); 100 only in a terminal state
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobState::Queued.can_transition_to(JobState::Sampling));
        assert!(JobState::Sampling.can_transition_to(JobState::Detecting));
        assert!(JobState::Detecting.can_transition_to(JobState::Aggregating));
        assert!(JobState::Aggregating.can_transition_to(JobState::Completed));
        assert!(JobState::Aggregating.can_transition_to(JobState::Degraded));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobState::Queued.can_transition_to(JobState::Detecting));
        assert!(!JobState::Detecting.can_transition_to(JobState::Completed));
        assert!(!JobState::Completed.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Failed));
        assert!(!JobState::Degraded.can_transition_to(JobState::Sampling));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in [
            JobState::Queued,
            JobState::Sampling,
            JobState::Detecting,
            JobState::Aggregating,
        ] {
            assert!(state.can_transition_to(JobState::Failed), "{}", state);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Degraded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Aggregating.is_terminal());
        assert!(JobState::Degraded.has_result());
        assert!(!JobState::Failed.has_result());
    }

    #[test]
    fn test_failure_reason_serialization() {
        let json = serde_json::to_value(FailureReason::Cancelled).unwrap();
        assert_eq!(json["kind"], "cancelled");

        let json = serde_json::to_value(FailureReason::SourceUnavailable("404".into())).unwrap();
        assert_eq!(json["kind"], "source_unavailable");
        assert_eq!(json["detail"], "404");
    }
}
