//! Axum HTTP API for product detection jobs.
//!
//! This crate provides:
//! - REST endpoints to create, poll, fetch, cancel and discard jobs
//! - CSV export of finished reports
//! - Liveness/readiness probes and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
