//! HTTP clients for the detection and embedding sidecars.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{MlClientError, MlClientResult};
use crate::types::{l2_normalize, Detection, ObjectDetector, ReidEmbedder};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the detection service
    pub detect_url: String,
    /// Base URL of the embedding service
    pub embed_url: String,
    /// Per-call timeout for detection
    pub detect_timeout: Duration,
    /// Per-call timeout for embedding
    pub embed_timeout: Duration,
    /// Retry attempts for idempotent calls
    pub max_retries: u32,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            detect_url: "http://localhost:5060".to_string(),
            embed_url: "http://localhost:5061".to_string(),
            detect_timeout: Duration::from_secs(30),
            embed_timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detect_url: std::env::var("DETECT_API_URL").unwrap_or(defaults.detect_url),
            embed_url: std::env::var("REID_API_URL").unwrap_or(defaults.embed_url),
            detect_timeout: Duration::from_secs(
                std::env::var("DETECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            embed_timeout: Duration::from_secs(
                std::env::var("EMBED_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_retries: std::env::var("ML_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    class_name: String,
    class_id: u32,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

/// Retry an operation with exponential backoff for retryable errors.
async fn with_retries<T, F, Fut>(max_retries: u32, operation_name: &str, op: F) -> MlClientResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = MlClientResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = Duration::from_millis(200 * 2u64.pow(attempt.min(4)));
                debug!("{operation_name} attempt {attempt} failed, retrying in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 0 {
                    warn!("{operation_name} failed after {} attempts: {e}", attempt + 1);
                }
                return Err(e);
            }
        }
    }
}

/// HTTP client for the object-detection service.
pub struct HttpDetector {
    client: reqwest::Client,
    config: MlClientConfig,
}

impl HttpDetector {
    pub fn new(config: MlClientConfig) -> MlClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.detect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn detect_once(&self, frame: &[u8], confidence_threshold: f32) -> MlClientResult<Vec<Detection>> {
        let part = multipart::Part::bytes(frame.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| MlClientError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new()
            .part("image", part)
            .text("conf", confidence_threshold.to_string());

        let url = format!("{}/detect", self.config.detect_url.trim_end_matches('/'));
        let resp = self.client.post(&url).multipart(form).send().await.map_err(|e| {
            if e.is_timeout() {
                MlClientError::Timeout(self.config.detect_timeout.as_secs())
            } else {
                MlClientError::Http(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MlClientError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DetectResponse = resp
            .json()
            .await
            .map_err(|e| MlClientError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .detections
            .into_iter()
            .map(|d| Detection {
                bbox: revid_models::BoundingBox::new(d.x, d.y, d.w, d.h),
                class_name: d.class_name,
                class_id: d.class_id,
                confidence: d.confidence,
            })
            .collect())
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn detect(&self, frame: &[u8], confidence_threshold: f32) -> MlClientResult<Vec<Detection>> {
        with_retries(self.config.max_retries, "detect", || {
            self.detect_once(frame, confidence_threshold)
        })
        .await
    }
}

/// HTTP client for the ReID embedding service.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: MlClientConfig,
}

impl HttpEmbedder {
    pub fn new(config: MlClientConfig) -> MlClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.embed_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn embed_once(&self, crop: &[u8]) -> MlClientResult<Vec<f32>> {
        let part = multipart::Part::bytes(crop.to_vec())
            .file_name("crop.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| MlClientError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new().part("image", part);

        let url = format!("{}/embed", self.config.embed_url.trim_end_matches('/'));
        let resp = self.client.post(&url).multipart(form).send().await.map_err(|e| {
            if e.is_timeout() {
                MlClientError::Timeout(self.config.embed_timeout.as_secs())
            } else {
                MlClientError::Http(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MlClientError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| MlClientError::InvalidResponse(e.to_string()))?;

        if parsed.vector.is_empty() {
            return Err(MlClientError::InvalidResponse("empty embedding vector".into()));
        }

        let mut vector = parsed.vector;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl ReidEmbedder for HttpEmbedder {
    async fn embed(&self, crop: &[u8]) -> MlClientResult<Vec<f32>> {
        with_retries(self.config.max_retries, "embed", || self.embed_once(crop)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_url: &str) -> MlClientConfig {
        MlClientConfig {
            detect_url: server_url.to_string(),
            embed_url: server_url.to_string(),
            detect_timeout: Duration::from_secs(5),
            embed_timeout: Duration::from_secs(5),
            max_retries: 1,
        }
    }

    #[tokio::test]
    async fn test_detect_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [
                    {"x": 10.0, "y": 20.0, "w": 50.0, "h": 40.0,
                     "class_name": "pickup truck", "class_id": 7, "confidence": 0.91}
                ]
            })))
            .mount(&server)
            .await;

        let detector = HttpDetector::new(test_config(&server.uri())).unwrap();
        let dets = detector.detect(b"fakejpeg", 0.08).await.unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "pickup truck");
        assert!((dets[0].bbox.w - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_embed_normalizes_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [3.0, 4.0]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(test_config(&server.uri())).unwrap();
        let vec = embedder.embed(b"fakejpeg").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad image"))
            .mount(&server)
            .await;

        let detector = HttpDetector::new(test_config(&server.uri())).unwrap();
        let err = detector.detect(b"fakejpeg", 0.08).await.unwrap_err();
        match err {
            MlClientError::BadStatus { status, .. } => assert_eq!(status, 400),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retries_on_server_error() {
        let server = MockServer::start().await;
        // First call 503, then success; max_retries=1 should recover
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": []
            })))
            .mount(&server)
            .await;

        let detector = HttpDetector::new(test_config(&server.uri())).unwrap();
        let dets = detector.detect(b"fakejpeg", 0.08).await.unwrap();
        assert!(dets.is_empty());
    }
}
