//! Analysis job state machine.

use std::sync::Arc;
use std::time::Instant;

use bv_models::{
    AnalysisConfig, AnalysisResult, FailureReason, JobId, JobState, JobStatus, ReferenceProduct,
    VideoRef,
};
use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};

use crate::error::{AnalysisError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressTracker;

/// Mutable part of a job, guarded by the handle's lock.
#[derive(Debug)]
struct JobRecord {
    state: JobState,
    progress: ProgressTracker,
    reason: Option<FailureReason>,
    result: Option<Arc<AnalysisResult>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One analysis job: frozen inputs plus its lifecycle state.
///
/// The orchestrator is the only writer. Readers get snapshots.
pub struct AnalysisJob {
    id: JobId,
    video: VideoRef,
    products: Vec<ReferenceProduct>,
    config: AnalysisConfig,
    record: RwLock<JobRecord>,
    state_tx: watch::Sender<JobState>,
    cancel_tx: watch::Sender<bool>,
    started: Instant,
    logger: JobLogger,
}

impl AnalysisJob {
    pub fn new(video: VideoRef, products: Vec<ReferenceProduct>, config: AnalysisConfig) -> Self {
        let id = JobId::new();
        let now = Utc::now();
        let (state_tx, _) = watch::channel(JobState::Queued);
        let (cancel_tx, _) = watch::channel(false);
        let logger = JobLogger::new(&id, "analysis");

        Self {
            id,
            video,
            products,
            config,
            record: RwLock::new(JobRecord {
                state: JobState::Queued,
                progress: ProgressTracker::default(),
                reason: None,
                result: None,
                created_at: now,
                updated_at: now,
            }),
            state_tx,
            cancel_tx,
            started: Instant::now(),
            logger,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn video(&self) -> &VideoRef {
        &self.video
    }

    pub fn products(&self) -> &[ReferenceProduct] {
        &self.products
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub async fn state(&self) -> JobState {
        self.record.read().await.state
    }

    /// Point-in-time status; progress reads 100 only in a terminal state.
    pub async fn status(&self) -> JobStatus {
        let record = self.record.read().await;
        let progress_percent = if record.state.is_terminal() {
            100
        } else {
            record.progress.percent()
        };

        JobStatus {
            job_id: self.id.clone(),
            state: record.state,
            progress_percent,
            reason: record.reason.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub async fn result(&self) -> Option<Arc<AnalysisResult>> {
        self.record.read().await.result.clone()
    }

    pub async fn failure_reason(&self) -> Option<FailureReason> {
        self.record.read().await.reason.clone()
    }

    /// Move to a non-terminal `next` state.
    pub async fn transition(&self, next: JobState) -> WorkerResult<()> {
        let mut record = self.record.write().await;
        self.apply_transition(&mut record, next)
    }

    fn apply_transition(&self, record: &mut JobRecord, next: JobState) -> WorkerResult<()> {
        let from = record.state;
        if !from.can_transition_to(next) {
            return Err(AnalysisError::InvalidTransition { from, to: next });
        }
        record.state = next;
        record.updated_at = Utc::now();
        self.logger.log_transition(from, next);
        self.state_tx.send_replace(next);
        Ok(())
    }

    pub async fn set_expected_frames(&self, expected: u64) {
        let mut record = self.record.write().await;
        record.progress.set_expected(expected);
        record.updated_at = Utc::now();
    }

    /// Record `done` frames finished (processed or dropped).
    pub async fn record_frames_done(&self, done: u64) {
        let mut record = self.record.write().await;
        if record.state.is_terminal() {
            return;
        }
        if let Some(percent) = record.progress.advance(done) {
            record.updated_at = Utc::now();
            if percent % 10 == 0 {
                self.logger
                    .log_progress(percent, record.progress.done(), record.progress.expected());
            }
        }
    }

    /// Finish with a result; `degraded` marks it as partial.
    pub async fn complete(&self, result: AnalysisResult, degraded: bool) -> WorkerResult<()> {
        let next = if degraded {
            JobState::Degraded
        } else {
            JobState::Completed
        };

        let mut record = self.record.write().await;
        self.apply_transition(&mut record, next)?;
        record.result = Some(Arc::new(result));
        drop(record);

        metrics::record_job_finished(next, self.started.elapsed().as_secs_f64());
        self.logger.log_completion(next, "report ready");
        Ok(())
    }

    /// Fail the job; returns false if it was already terminal.
    pub async fn fail(&self, reason: FailureReason) -> bool {
        let mut record = self.record.write().await;
        if record.state.is_terminal() {
            return false;
        }
        if self.apply_transition(&mut record, JobState::Failed).is_err() {
            return false;
        }
        record.reason = Some(reason.clone());
        record.result = None;
        drop(record);

        metrics::record_job_finished(JobState::Failed, self.started.elapsed().as_secs_f64());
        self.logger.log_error(&reason.to_string());
        true
    }

    /// Signal cancellation and fail the job; no-op for terminal jobs.
    pub async fn cancel(&self) -> bool {
        let cancelled = self.fail(FailureReason::Cancelled).await;
        if cancelled {
            self.cancel_tx.send_replace(true);
        }
        cancelled
    }

    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_terminal(&self) -> JobState {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state().await;
            }
        }
    }
}

impl std::fmt::Debug for AnalysisJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisJob")
            .field("id", &self.id)
            .field("video", &self.video)
            .field("products", &self.products.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> AnalysisJob {
        AnalysisJob::new(
            VideoRef::from("/data/v.mp4"),
            vec![ReferenceProduct::new("a", "Can", "/refs/a.png", 80)],
            AnalysisConfig::default(),
        )
    }

    fn empty_result() -> AnalysisResult {
        AnalysisResult {
            video_title: "v".into(),
            duration_seconds: 1.0,
            total_detections: 0,
            unique_product_count: 0,
            total_visible_seconds: 0.0,
            partial_data: false,
            frames_sampled: 1,
            frames_dropped: 0,
            products: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_happy_path() {
        let job = job();
        job.transition(JobState::Sampling).await.unwrap();
        job.transition(JobState::Detecting).await.unwrap();
        job.set_expected_frames(4).await;
        job.record_frames_done(2).await;
        assert_eq!(job.status().await.progress_percent, 50);

        job.transition(JobState::Aggregating).await.unwrap();
        job.complete(empty_result(), false).await.unwrap();

        let status = job.status().await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress_percent, 100);
        assert!(job.result().await.is_some());
        assert_eq!(job.wait_terminal().await, JobState::Completed);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let job = job();
        let err = job.transition(JobState::Aggregating).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidTransition {
                from: JobState::Queued,
                to: JobState::Aggregating
            }
        ));
        assert_eq!(job.state().await, JobState::Queued);
    }

    #[tokio::test]
    async fn test_cancel_fails_job_and_signals() {
        let job = job();
        let rx = job.cancel_receiver();
        job.transition(JobState::Sampling).await.unwrap();

        assert!(job.cancel().await);
        assert!(*rx.borrow());
        assert_eq!(job.failure_reason().await, Some(FailureReason::Cancelled));

        // Idempotent, and later completion is refused
        assert!(!job.cancel().await);
        assert!(job.complete(empty_result(), false).await.is_err());
        assert!(job.result().await.is_none());
    }

    #[tokio::test]
    async fn test_progress_frozen_after_terminal() {
        let job = job();
        job.set_expected_frames(10).await;
        job.fail(FailureReason::TimedOut).await;
        job.record_frames_done(5).await;
        assert_eq!(job.status().await.progress_percent, 100);
        assert_eq!(job.status().await.reason, Some(FailureReason::TimedOut));
    }
}
