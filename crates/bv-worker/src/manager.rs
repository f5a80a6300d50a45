//! In-process job registry and scheduler.
//!
//! Jobs are validated up front, stored by id and run on background tasks.
//! At most `max_concurrent_jobs` pipelines run at once; the rest wait in
//! `Queued` for a permit.

use std::collections::HashMap;
use std::sync::Arc;

use bv_media::{FfmpegSource, VideoSource};
use bv_models::{
    validate_product_set, AnalysisConfig, AnalysisResult, FailureReason, JobId, JobState,
    JobStatus, ReferenceProduct, VideoRef,
};
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

use crate::error::{AnalysisError, WorkerResult};
use crate::job::AnalysisJob;
use crate::metrics;
use crate::pipeline::AnalysisPipeline;

/// Resolves a video reference to something the sampler can decode.
pub trait SourceFactory: Send + Sync {
    fn source_for(&self, video: &VideoRef) -> Arc<dyn VideoSource>;
}

/// Decodes every reference with FFmpeg at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegSourceFactory {
    width: u32,
    height: u32,
}

impl FfmpegSourceFactory {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl SourceFactory for FfmpegSourceFactory {
    fn source_for(&self, video: &VideoRef) -> Arc<dyn VideoSource> {
        Arc::new(FfmpegSource::new(video.clone()).with_size(self.width, self.height))
    }
}

/// Acknowledgement returned by `cancel_job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAck {
    pub job_id: JobId,
    /// False when the job had already finished
    pub cancelled: bool,
    pub state: JobState,
}

/// Owns every job created in this process.
pub struct JobManager {
    jobs: RwLock<HashMap<JobId, Arc<AnalysisJob>>>,
    pipeline: AnalysisPipeline,
    sources: Arc<dyn SourceFactory>,
    job_slots: Arc<Semaphore>,
}

impl JobManager {
    pub fn new(pipeline: AnalysisPipeline, sources: Arc<dyn SourceFactory>) -> Self {
        let slots = pipeline.config().max_concurrent_jobs.max(1);
        Self {
            jobs: RwLock::new(HashMap::new()),
            pipeline,
            sources,
            job_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Manager decoding with FFmpeg at the pipeline's configured frame size.
    pub fn with_ffmpeg(pipeline: AnalysisPipeline) -> Self {
        let config = pipeline.config();
        let factory = FfmpegSourceFactory::new(config.frame_width, config.frame_height);
        Self::new(pipeline, Arc::new(factory))
    }

    /// Validate inputs, register a job and start it in the background.
    ///
    /// Invalid input is rejected here and no job is created.
    pub async fn create_job(
        &self,
        video: VideoRef,
        products: Vec<ReferenceProduct>,
        config: AnalysisConfig,
    ) -> WorkerResult<JobId> {
        config.validate()?;
        video.validate()?;
        validate_product_set(&products)?;

        let job = Arc::new(AnalysisJob::new(video, products, config));
        let job_id = job.id().clone();
        let source = self.sources.source_for(job.video());

        self.jobs.write().await.insert(job_id.clone(), Arc::clone(&job));
        metrics::record_job_created();
        info!(
            job_id = %job_id,
            video = %job.video(),
            frame_rate = config.frame_rate,
            sensitivity = config.sensitivity.as_str(),
            "Job created"
        );

        let pipeline = self.pipeline.clone();
        let slots = Arc::clone(&self.job_slots);
        tokio::spawn(async move {
            run_job(pipeline, slots, job, source).await;
        });

        Ok(job_id)
    }

    pub async fn job(&self, job_id: &JobId) -> WorkerResult<Arc<AnalysisJob>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| AnalysisError::NotFound(job_id.clone()))
    }

    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<JobStatus> {
        Ok(self.job(job_id).await?.status().await)
    }

    /// Result of a completed or degraded job.
    pub async fn get_result(&self, job_id: &JobId) -> WorkerResult<Arc<AnalysisResult>> {
        let job = self.job(job_id).await?;
        let state = job.state().await;

        if state == JobState::Failed {
            let reason = job
                .failure_reason()
                .await
                .unwrap_or_else(|| FailureReason::Internal("unknown failure".into()));
            return Err(AnalysisError::JobFailed(reason));
        }
        if !state.has_result() {
            return Err(AnalysisError::NotReady(job_id.clone(), state));
        }

        job.result()
            .await
            .ok_or_else(|| AnalysisError::internal("finished job has no result"))
    }

    /// Request cancellation; finished jobs are left untouched.
    pub async fn cancel_job(&self, job_id: &JobId) -> WorkerResult<CancelAck> {
        let job = self.job(job_id).await?;
        let cancelled = job.cancel().await;
        if cancelled {
            info!(job_id = %job_id, "Job cancelled");
        }

        Ok(CancelAck {
            job_id: job_id.clone(),
            cancelled,
            state: job.state().await,
        })
    }

    /// Forget a finished job.
    pub async fn discard_job(&self, job_id: &JobId) -> WorkerResult<()> {
        let job = self.job(job_id).await?;
        let state = job.state().await;
        if !state.is_terminal() {
            return Err(AnalysisError::NotReady(job_id.clone(), state));
        }
        self.jobs.write().await.remove(job_id);
        Ok(())
    }

    /// Wait until the job is terminal and return its final status.
    pub async fn wait(&self, job_id: &JobId) -> WorkerResult<JobStatus> {
        let job = self.job(job_id).await?;
        job.wait_terminal().await;
        Ok(job.status().await)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }
}

async fn run_job(
    pipeline: AnalysisPipeline,
    slots: Arc<Semaphore>,
    job: Arc<AnalysisJob>,
    source: Arc<dyn VideoSource>,
) {
    let mut cancel = job.cancel_receiver();

    // Cancelled while queued: nothing to run
    let _permit = tokio::select! {
        biased;
        _ = async { let _ = cancel.wait_for(|c| *c).await; } => return,
        permit = slots.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                job.fail(FailureReason::Internal("job scheduler closed".into())).await;
                return;
            }
        },
    };

    if let Err(e) = pipeline.run(&job, source.as_ref()).await {
        let reason = e.failure_reason();
        if !job.fail(reason).await && !matches!(e, AnalysisError::Cancelled) {
            warn!(job_id = %job.id(), error = %e, "Pipeline error after job finished");
        }
    }
}
