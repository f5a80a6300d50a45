//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bv_models::{ConfigError, FailureReason};
use bv_worker::AnalysisError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(#[from] ConfigError),

    #[error("Job failed: {0}")]
    JobFailed(FailureReason),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) | ApiError::Configuration(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::JobFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    fn code(&self) -> Option<&'static str> {
        let code = match self {
            ApiError::NotFound(_) => "job_not_found",
            ApiError::Conflict(_) => "job_not_ready",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Configuration(e) => match e {
                ConfigError::InvalidRate(_) => "invalid_rate",
                ConfigError::EmptyProductSet => "empty_product_set",
                ConfigError::InvalidProduct(_) => "invalid_product",
                ConfigError::DuplicateProductId(_) => "duplicate_product_id",
                ConfigError::InvalidVideoRef(_) => "invalid_video_ref",
            },
            ApiError::JobFailed(_) => "job_failed",
            ApiError::BadRequest(_) | ApiError::Internal(_) => return None,
        };
        Some(code)
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Configuration(e) => ApiError::Configuration(e),
            AnalysisError::NotFound(id) => ApiError::NotFound(format!("job {}", id)),
            AnalysisError::NotReady(id, state) => {
                ApiError::Conflict(format!("job {} is {}", id, state))
            }
            AnalysisError::JobFailed(reason) => ApiError::JobFailed(reason),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<FailureReason>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let reason = match &self {
            ApiError::JobFailed(reason) => Some(reason.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
            reason,
        };

        (status, Json(body)).into_response()
    }
}
