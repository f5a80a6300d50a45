//! Shared data models for the Brand Vision analysis pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Reference products and analysis configuration
//! - Raw and deduplicated detections
//! - Per-product aggregates and the final analysis report
//! - Job identifiers, states and status snapshots
//! - Presentation helpers (clock formatting, coverage, confidence tiers)

pub mod config;
pub mod detection;
pub mod job;
pub mod product;
pub mod report;
pub mod timestamp;
pub mod video;

// Re-export common types
pub use config::{AnalysisConfig, ConfigError, Sensitivity};
pub use detection::{Detection, RawDetection};
pub use job::{FailureReason, JobId, JobState, JobStatus};
pub use product::{active_products, validate_product_set, ProductId, ReferenceProduct};
pub use report::{union_length, AnalysisResult, ConfidenceTier, ProductAggregate, VisibleInterval};
pub use timestamp::{format_clock, parse_clock, ClockError};
pub use video::{VideoMetadata, VideoRef};
