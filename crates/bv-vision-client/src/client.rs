//! Frame-level product detection on top of a vision backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bv_media::{Frame, DEFAULT_JPEG_QUALITY};
use bv_models::{ProductId, RawDetection, ReferenceProduct, Sensitivity};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{HttpVisionBackend, VisionBackend};
use crate::error::{VisionError, VisionResult};
use crate::retry::{retry_async, RetryConfig, RetryResult};
use crate::types::{MatchRequest, ProductMatch, ProductRef};

/// Configuration for the detection client.
#[derive(Debug, Clone)]
pub struct VisionClientConfig {
    /// Base URL of the vision service
    pub base_url: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
    /// JPEG quality of frames sent over the wire
    pub jpeg_quality: u8,
}

impl Default for VisionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryConfig::new("vision_match"),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl VisionClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry = RetryConfig::new("vision_match")
            .with_max_retries(
                std::env::var("VISION_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_retries),
            )
            .with_base_delay(Duration::from_millis(
                std::env::var("VISION_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200),
            ))
            .with_max_delay(Duration::from_millis(
                std::env::var("VISION_RETRY_MAX_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ));

        Self {
            base_url: std::env::var("VISION_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_millis(
                std::env::var("VISION_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10_000),
            ),
            retry,
            jpeg_quality: std::env::var("VISION_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }
}

/// A frame whose detection call could not be completed.
///
/// Counted against the job's failure budget rather than failing the job.
#[derive(Debug, Error)]
#[error("frame {frame_index} at {timestamp_seconds:.3}s dropped after {attempts} attempt(s): {error}")]
pub struct FrameDropped {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    pub attempts: u32,
    #[source]
    pub error: VisionError,
}

/// Turns frames into raw detections by asking a vision backend.
#[derive(Clone)]
pub struct DetectionClient {
    backend: Arc<dyn VisionBackend>,
    config: VisionClientConfig,
}

impl DetectionClient {
    pub fn new(backend: Arc<dyn VisionBackend>, config: VisionClientConfig) -> Self {
        Self { backend, config }
    }

    /// HTTP-backed client configured from environment variables.
    pub fn from_env() -> VisionResult<Self> {
        let config = VisionClientConfig::from_env();
        // Transport ceiling sits above the per-call timeout
        let backend = HttpVisionBackend::new(config.base_url.clone(), config.timeout * 2)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn config(&self) -> &VisionClientConfig {
        &self.config
    }

    pub async fn health_check(&self) -> VisionResult<bool> {
        self.backend.health_check().await
    }

    /// Detect active products in `frame`.
    ///
    /// Returns one detection per product whose score exceeds its effective
    /// threshold, ordered by product id, or `FrameDropped` when the backend
    /// keeps failing.
    pub async fn detect(
        &self,
        frame: &Frame,
        products: &[ReferenceProduct],
        sensitivity: Sensitivity,
    ) -> Result<Vec<RawDetection>, FrameDropped> {
        let active: Vec<&ReferenceProduct> = products.iter().filter(|p| p.active).collect();
        if active.is_empty() {
            return Ok(Vec::new());
        }

        let dropped = |error: VisionError, attempts: u32| FrameDropped {
            frame_index: frame.index,
            timestamp_seconds: frame.timestamp_seconds,
            attempts,
            error,
        };

        let jpeg = frame
            .to_jpeg(self.config.jpeg_quality)
            .map_err(|e| dropped(VisionError::Encode(e.to_string()), 0))?;

        let request = MatchRequest {
            timestamp_seconds: frame.timestamp_seconds,
            frame_jpeg_base64: STANDARD.encode(jpeg),
            products: active.iter().map(|p| ProductRef::from(*p)).collect(),
        };

        let timeout = self.config.timeout;
        let result = retry_async(&self.config.retry, VisionError::is_retryable, || async {
            match tokio::time::timeout(timeout, self.backend.match_frame(&request)).await {
                Ok(result) => result,
                Err(_) => Err(VisionError::Timeout(timeout.as_millis() as u64)),
            }
        })
        .await;

        match result {
            RetryResult::Success(matches) => {
                let detections = apply_thresholds(frame.timestamp_seconds, &active, &matches, sensitivity);
                debug!(
                    frame = frame.index,
                    detections = detections.len(),
                    "Frame matched"
                );
                Ok(detections)
            }
            RetryResult::Failed { error, attempts } => {
                warn!(
                    frame = frame.index,
                    timestamp = frame.timestamp_seconds,
                    attempts,
                    error = %error,
                    "Dropping frame after failed detection"
                );
                Err(dropped(error, attempts))
            }
        }
    }
}

/// Keep scores strictly above each product's effective threshold.
///
/// Scores for ids outside `products` are ignored; repeated ids keep the best score.
pub fn apply_thresholds(
    timestamp_seconds: f64,
    products: &[&ReferenceProduct],
    matches: &[ProductMatch],
    sensitivity: Sensitivity,
) -> Vec<RawDetection> {
    let thresholds: BTreeMap<&ProductId, u8> = products
        .iter()
        .map(|p| (&p.id, sensitivity.effective_threshold(p.min_confidence)))
        .collect();

    let mut best: BTreeMap<&ProductId, f64> = BTreeMap::new();
    for m in matches {
        if !m.score.is_finite() {
            continue;
        }
        let Some(threshold) = thresholds.get(&m.product_id) else {
            continue;
        };
        let score = m.score.clamp(0.0, 100.0);
        if score > f64::from(*threshold) {
            let entry = best.entry(&m.product_id).or_insert(score);
            if score > *entry {
                *entry = score;
            }
        }
    }

    best.into_iter()
        .map(|(id, score)| RawDetection::new(id.clone(), timestamp_seconds, score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bv_media::solid_image;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Backend that fails a fixed number of times, then returns `matches`.
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
        matches: Vec<ProductMatch>,
        seen: Mutex<Vec<MatchRequest>>,
        permanent: bool,
    }

    impl FlakyBackend {
        fn new(failures: u32, matches: Vec<ProductMatch>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                matches,
                seen: Mutex::new(Vec::new()),
                permanent: false,
            }
        }
    }

    #[async_trait]
    impl VisionBackend for FlakyBackend {
        async fn match_frame(&self, request: &MatchRequest) -> VisionResult<Vec<ProductMatch>> {
            self.seen.lock().unwrap().push(request.clone());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.permanent {
                    return Err(VisionError::Rejected { status: 400, body: String::new() });
                }
                return Err(VisionError::ServiceUnavailable("down".into()));
            }
            Ok(self.matches.clone())
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl VisionBackend for SlowBackend {
        async fn match_frame(&self, _request: &MatchRequest) -> VisionResult<Vec<ProductMatch>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn config(max_retries: u32) -> VisionClientConfig {
        VisionClientConfig {
            timeout: Duration::from_millis(50),
            retry: RetryConfig::new("test")
                .with_max_retries(max_retries)
                .with_base_delay(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    fn frame() -> Frame {
        Frame::new(3, 1.5, solid_image(8, 8, [0, 0, 0]))
    }

    fn products() -> Vec<ReferenceProduct> {
        vec![
            ReferenceProduct::new("b", "Bottle", "/refs/b.png", 80),
            ReferenceProduct::new("a", "Can", "/refs/a.png", 85),
            ReferenceProduct::new("z", "Hidden", "/refs/z.png", 10).inactive(),
        ]
    }

    #[test]
    fn test_threshold_is_strict_and_sensitivity_aware() {
        let products = products();
        let refs: Vec<&ReferenceProduct> = products.iter().filter(|p| p.active).collect();
        let matches = vec![
            ProductMatch::new("a", 85.0),
            ProductMatch::new("b", 80.5),
            ProductMatch::new("unknown", 99.0),
        ];

        let medium = apply_thresholds(1.0, &refs, &matches, Sensitivity::Medium);
        assert_eq!(medium.len(), 1);
        assert_eq!(medium[0].product_id.as_str(), "b");

        let low = apply_thresholds(1.0, &refs, &matches, Sensitivity::Low);
        let ids: Vec<&str> = low.iter().map(|d| d.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let high = apply_thresholds(1.0, &refs, &matches, Sensitivity::High);
        assert!(high.is_empty());
    }

    #[test]
    fn test_repeated_ids_keep_best_score() {
        let products = products();
        let refs: Vec<&ReferenceProduct> = products.iter().filter(|p| p.active).collect();
        let matches = vec![ProductMatch::new("a", 90.0), ProductMatch::new("a", 97.0)];

        let detections = apply_thresholds(0.0, &refs, &matches, Sensitivity::Medium);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 97.0);
    }

    #[tokio::test]
    async fn test_inactive_products_never_sent() {
        let backend = Arc::new(FlakyBackend::new(0, vec![ProductMatch::new("z", 99.0)]));
        let client = DetectionClient::new(backend.clone(), config(0));

        let detections = client.detect(&frame(), &products(), Sensitivity::Medium).await.unwrap();
        assert!(detections.is_empty());

        let seen = backend.seen.lock().unwrap();
        let sent: Vec<&str> = seen[0].products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(sent, vec!["b", "a"]);
        assert!(!seen[0].frame_jpeg_base64.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(FlakyBackend::new(2, vec![ProductMatch::new("a", 95.0)]));
        let client = DetectionClient::new(backend.clone(), config(3));

        let detections = client.detect(&frame(), &products(), Sensitivity::Medium).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].timestamp_seconds, 1.5);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_frame() {
        let backend = Arc::new(FlakyBackend::new(10, Vec::new()));
        let client = DetectionClient::new(backend.clone(), config(2));

        let dropped = client
            .detect(&frame(), &products(), Sensitivity::Medium)
            .await
            .unwrap_err();
        assert_eq!(dropped.frame_index, 3);
        assert_eq!(dropped.attempts, 3);
        assert!(dropped.error.is_retryable());
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_without_retry() {
        let mut flaky = FlakyBackend::new(10, Vec::new());
        flaky.permanent = true;
        let backend = Arc::new(flaky);
        let client = DetectionClient::new(backend.clone(), config(5));

        let dropped = client
            .detect(&frame(), &products(), Sensitivity::Medium)
            .await
            .unwrap_err();
        assert_eq!(dropped.attempts, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_per_call_timeout() {
        let client = DetectionClient::new(Arc::new(SlowBackend), config(1));

        let dropped = client
            .detect(&frame(), &products(), Sensitivity::Medium)
            .await
            .unwrap_err();
        assert!(matches!(dropped.error, VisionError::Timeout(50)));
        assert_eq!(dropped.attempts, 2);
    }
}
