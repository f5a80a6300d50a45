//! Vision client error types.

use thiserror::Error;

pub type VisionResult<T> = Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Vision service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Vision service rate limited the request")]
    RateLimited,

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VisionError {
    /// Transient failures are worth another attempt; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VisionError::ServiceUnavailable(_)
                | VisionError::RateLimited
                | VisionError::Timeout(_)
                | VisionError::Network(_)
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => VisionError::RateLimited,
            500..=599 => VisionError::ServiceUnavailable(format!("{}: {}", status, body)),
            _ => VisionError::Rejected { status, body },
        }
    }
}
