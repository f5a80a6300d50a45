//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};

use bv_models::JobState;

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_SAMPLED_TOTAL: &str = "bv_frames_sampled_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "bv_frames_dropped_total";
    pub const DETECTIONS_KEPT_TOTAL: &str = "bv_detections_kept_total";
    pub const DETECTION_CALL_DURATION_SECONDS: &str = "bv_detection_call_duration_seconds";
    pub const JOBS_CREATED_TOTAL: &str = "bv_jobs_created_total";
    pub const JOBS_FINISHED_TOTAL: &str = "bv_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "bv_job_duration_seconds";
}

pub fn record_frame_sampled() {
    counter!(names::FRAMES_SAMPLED_TOTAL).increment(1);
}

/// Record dropped frames; `cause` is "detection", "timeout" or "source".
pub fn record_frames_dropped(cause: &'static str, count: u64) {
    if count == 0 {
        return;
    }
    counter!(names::FRAMES_DROPPED_TOTAL, "cause" => cause).increment(count);
}

pub fn record_detection_call(duration_secs: f64) {
    histogram!(names::DETECTION_CALL_DURATION_SECONDS).record(duration_secs);
}

pub fn record_detections_kept(count: u64) {
    counter!(names::DETECTIONS_KEPT_TOTAL).increment(count);
}

pub fn record_job_created() {
    counter!(names::JOBS_CREATED_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(state: JobState, duration_secs: f64) {
    let labels = [("state", state.as_str().to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}
