//! Product detection analysis worker.
//!
//! This crate provides:
//! - Temporal deduplication and interval aggregation of detections
//! - Report assembly with confidence tiers and coverage
//! - The `AnalysisJob` state machine with progress and cancellation
//! - A bounded-concurrency pipeline over sampler and detection client
//! - An in-process `JobManager` exposing the job API

pub mod config;
pub mod dedup;
pub mod error;
pub mod intervals;
pub mod job;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use config::WorkerConfig;
pub use dedup::TemporalDeduplicator;
pub use error::{AnalysisError, WorkerResult};
pub use intervals::IntervalAggregator;
pub use job::AnalysisJob;
pub use logging::JobLogger;
pub use manager::{CancelAck, FfmpegSourceFactory, JobManager, SourceFactory};
pub use pipeline::AnalysisPipeline;
pub use progress::{progress_percent, ProgressTracker};
pub use report::{FrameCoverage, ReportBuilder};
