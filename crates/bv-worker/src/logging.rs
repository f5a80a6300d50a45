//! Structured job logging utilities.
//!
//! Every line carries the job id and stage so a single analysis can be
//! followed through the pipeline in JSON logs.

use bv_models::{JobId, JobState};
use tracing::{error, info, warn, Span};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a logger for a job and pipeline operation (e.g. "analysis").
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a state change.
    pub fn log_transition(&self, from: JobState, to: JobState) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            from = from.as_str(),
            to = to.as_str(),
            "Job state changed"
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, percent: u8, frames_done: u64, frames_expected: u64) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            percent,
            frames_done,
            frames_expected,
            "Job progress"
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    /// Log the end of a job operation.
    pub fn log_completion(&self, state: JobState, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            state = state.as_str(),
            "Job finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}
