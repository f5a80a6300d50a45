//! Worker configuration.

use std::time::Duration;

use bv_media::{DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent analysis jobs
    pub max_concurrent_jobs: usize,
    /// Maximum detection calls in flight per job
    pub max_inflight_detections: usize,
    /// Dropped/attempted frame ratio above which a job is degraded
    pub failure_threshold: f64,
    /// Wall-clock limit per job; `None` disables it
    pub job_timeout: Option<Duration>,
    /// Decode resolution handed to FFmpeg
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_inflight_detections: 8,
            failure_threshold: 0.20,
            job_timeout: Some(Duration::from_secs(3600)), // 1 hour
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// `WORKER_JOB_TIMEOUT_SECS=0` disables the job timeout.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let job_timeout = match std::env::var("WORKER_JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.job_timeout,
        };

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_inflight_detections: std::env::var("WORKER_MAX_INFLIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_inflight_detections),
            failure_threshold: std::env::var("WORKER_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|t: &f64| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.failure_threshold),
            job_timeout,
            frame_width: std::env::var("WORKER_FRAME_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frame_width),
            frame_height: std::env::var("WORKER_FRAME_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frame_height),
        }
    }

    pub fn with_max_inflight(mut self, n: usize) -> Self {
        self.max_inflight_detections = n.max(1);
        self
    }

    pub fn with_failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_inflight_detections, 8);
        assert!((config.failure_threshold - 0.20).abs() < f64::EPSILON);
        assert_eq!(config.job_timeout, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_builder_clamps_inflight() {
        let config = WorkerConfig::default().with_max_inflight(0);
        assert_eq!(config.max_inflight_detections, 1);
    }
}
