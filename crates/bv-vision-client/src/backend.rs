//! Backends that score frames against reference products.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{VisionError, VisionResult};
use crate::types::{HealthResponse, MatchRequest, MatchResponse, ProductMatch};

/// The external vision capability.
///
/// Implementations return one score per product they recognise; the caller
/// applies thresholds.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn match_frame(&self, request: &MatchRequest) -> VisionResult<Vec<ProductMatch>>;

    /// Whether the backend is ready to take requests.
    async fn health_check(&self) -> VisionResult<bool> {
        Ok(true)
    }
}

/// Vision service reached over HTTP.
pub struct HttpVisionBackend {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpVisionBackend {
    /// `request_timeout` is a transport-level ceiling; per-call timeouts are
    /// enforced by the detection client.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> VisionResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(VisionError::Network)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn match_frame(&self, request: &MatchRequest) -> VisionResult<Vec<ProductMatch>> {
        let url = format!("{}/match", self.base_url);

        debug!(
            timestamp = request.timestamp_seconds,
            products = request.products.len(),
            "Sending match request to {}",
            url
        );

        let response = self.http.post(&url).json(request).send().await.map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout(self.request_timeout.as_millis() as u64)
            } else {
                VisionError::Network(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(VisionError::from_status(status.as_u16(), body));
        }

        let parsed: MatchResponse = serde_json::from_str(&body)
            .map_err(|e| VisionError::InvalidResponse(format!("{}: {}", e, truncate(&body))))?;
        Ok(parsed.matches)
    }

    async fn health_check(&self) -> VisionResult<bool> {
        let url = format!("{}/health", self.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Vision service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Vision service health check error: {}", e);
                Ok(false)
            }
        }
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> MatchRequest {
        MatchRequest {
            timestamp_seconds: 1.5,
            frame_jpeg_base64: "AAAA".into(),
            products: vec![crate::types::ProductRef {
                id: "a".into(),
                image_ref: "/refs/a.png".into(),
            }],
        }
    }

    #[tokio::test]
    async fn test_match_parses_scores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match"))
            .and(body_partial_json(json!({
                "timestampSeconds": 1.5,
                "products": [{"id": "a", "imageRef": "/refs/a.png"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [{"productId": "a", "score": 91.5}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpVisionBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        let matches = backend.match_frame(&request()).await.unwrap();

        assert_eq!(matches, vec![ProductMatch::new("a", 91.5)]);
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = HttpVisionBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = backend.match_frame(&request()).await.unwrap_err();
        assert!(matches!(err, VisionError::ServiceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_request_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad frame"))
            .mount(&server)
            .await;

        let backend = HttpVisionBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = backend.match_frame(&request()).await.unwrap_err();
        assert!(matches!(err, VisionError::Rejected { status: 422, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let backend = HttpVisionBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = backend.match_frame(&request()).await.unwrap_err();
        assert!(matches!(err, VisionError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let backend = HttpVisionBackend::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        assert!(backend.health_check().await.unwrap());
    }
}
