//! Analysis error types.

use bv_media::MediaError;
use bv_models::{ConfigError, FailureReason, JobId, JobState};
use bv_vision_client::FrameDropped;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Rejected before any work starts; never retried.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Video source error: {0}")]
    Source(#[from] MediaError),

    /// A frame's detection call failed; absorbed into the drop count.
    #[error("Transient detection failure: {0}")]
    TransientDetection(String),

    #[error("Dropped {dropped} of {attempted} frames")]
    ThresholdExceeded { dropped: u64, attempted: u64 },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job timed out before any frame was analysed")]
    TimedOut,

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {0} is not finished (state: {1})")]
    NotReady(JobId, JobState),

    #[error("Job failed: {0}")]
    JobFailed(FailureReason),

    #[error("Illegal job transition from {from} to {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FrameDropped> for AnalysisError {
    fn from(dropped: FrameDropped) -> Self {
        Self::TransientDetection(dropped.to_string())
    }
}

impl AnalysisError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Reason recorded on a job that ends with this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            AnalysisError::Configuration(ConfigError::InvalidRate(_)) => FailureReason::InvalidRate,
            AnalysisError::Configuration(ConfigError::EmptyProductSet) => {
                FailureReason::EmptyProductSet
            }
            AnalysisError::Configuration(other) => FailureReason::Internal(other.to_string()),
            AnalysisError::Source(MediaError::InvalidRate(_)) => FailureReason::InvalidRate,
            AnalysisError::Source(e) => FailureReason::SourceUnavailable(e.to_string()),
            AnalysisError::Cancelled => FailureReason::Cancelled,
            AnalysisError::TimedOut => FailureReason::TimedOut,
            AnalysisError::JobFailed(reason) => reason.clone(),
            other => FailureReason::Internal(other.to_string()),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::TransientDetection(_))
    }

    /// Errors caused by the caller's input rather than by processing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::Configuration(_))
    }
}
