//! Analysis job handlers.
//!
//! Thin HTTP binding over `JobManager`: create, poll, fetch, cancel and
//! discard jobs.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bv_models::{AnalysisConfig, AnalysisResult, JobId, JobStatus, ReferenceProduct, VideoRef};
use bv_worker::CancelAck;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `POST /api/jobs`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Local path or http(s) URL of the video
    #[validate(length(min = 1, max = 4096))]
    pub video_ref: String,

    /// Reference products; inactive ones are kept but never searched for
    #[validate(length(max = 500))]
    pub products: Vec<ReferenceProduct>,

    #[serde(default)]
    pub config: AnalysisConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

/// Create an analysis job.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let job_id = state
        .jobs
        .create_job(VideoRef::new(request.video_ref), request.products, request.config)
        .await?;

    info!(job_id = %job_id, "Accepted analysis job");
    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id })))
}

/// Current state and progress of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    let status = state.jobs.get_status(&JobId::from_string(job_id)).await?;
    Ok(Json(status))
}

/// Final report of a completed or degraded job.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalysisResult>> {
    let result = state.jobs.get_result(&JobId::from_string(job_id)).await?;
    Ok(Json(result.as_ref().clone()))
}

/// Per-product CSV export of the final report.
pub async fn get_job_result_csv(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job_id = JobId::from_string(job_id);
    let result = state.jobs.get_result(&job_id).await?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.csv\"", job_id),
        ),
    ];
    Ok((headers, result.to_csv()))
}

/// Request cancellation of a job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<CancelAck>)> {
    let ack = state.jobs.cancel_job(&JobId::from_string(job_id)).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

/// Remove a finished job and its result.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = JobId::from_string(job_id);
    state.jobs.discard_job(&job_id).await?;
    info!(job_id = %job_id, "Discarded job");
    Ok(StatusCode::NO_CONTENT)
}
