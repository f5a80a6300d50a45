//! Application state.

use std::sync::Arc;

use bv_vision_client::{DetectionClient, VisionResult};
use bv_worker::{AnalysisPipeline, JobManager, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<JobManager>,
}

impl AppState {
    pub fn new(config: ApiConfig, jobs: JobManager) -> Self {
        Self {
            config,
            jobs: Arc::new(jobs),
        }
    }

    /// State backed by FFmpeg decoding and the HTTP vision service.
    pub fn from_env(config: ApiConfig) -> VisionResult<Self> {
        let client = DetectionClient::from_env()?;
        let pipeline = AnalysisPipeline::new(client, WorkerConfig::from_env());
        Ok(Self::new(config, JobManager::with_ffmpeg(pipeline)))
    }
}
