//! Client for the external product-matching vision service.
//!
//! The vision service scores a frame against a set of reference product
//! images. This crate wraps it behind the `VisionBackend` trait and adds
//! the per-frame policy the pipeline needs: active-product filtering,
//! sensitivity thresholds, per-call timeouts, and retry with backoff.

pub mod backend;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use backend::{HttpVisionBackend, VisionBackend};
pub use client::{apply_thresholds, DetectionClient, FrameDropped, VisionClientConfig};
pub use error::{VisionError, VisionResult};
pub use retry::{retry_async, RetryConfig, RetryResult};
pub use types::{MatchRequest, MatchResponse, ProductMatch, ProductRef};
