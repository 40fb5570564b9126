//! Emotion classification HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use emo_models::{AnalysisResponse, EncodedImage};

use crate::error::{ClientError, ClientResult};

/// Most faces the service accepts per request.
pub const MAX_BATCH: usize = 8;

/// Largest image the service accepts, in bytes.
pub const MAX_IMAGE_BYTES: usize = 300 * 1024;

/// Context sent when the user left it blank.
const NO_CONTEXT: &str = "No context provided";

/// Longest server body echoed into an error.
const MAX_DETAIL_CHARS: usize = 200;

/// Configuration for the classification client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the classification service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Extra attempts for transient failures
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(20),
            max_retries: 1,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("EMOTION_SERVICE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("EMOTION_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("EMOTION_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Remote emotion classification of a batch of faces.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Classify `images` in one request, with free-text `context`.
    async fn classify(
        &self,
        images: &[EncodedImage],
        context: &str,
    ) -> ClientResult<AnalysisResponse>;
}

/// reqwest-backed classifier talking to `POST {base_url}/analyze`.
pub struct ClassifierClient {
    http: Client,
    config: ClientConfig,
}

impl ClassifierClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Reject batches the service would refuse anyway.
    fn validate(images: &[EncodedImage]) -> ClientResult<()> {
        if images.is_empty() {
            return Err(ClientError::invalid_request("no images provided"));
        }
        if images.len() > MAX_BATCH {
            return Err(ClientError::invalid_request(format!(
                "max {} images allowed, got {}",
                MAX_BATCH,
                images.len()
            )));
        }
        if let Some((i, img)) = images
            .iter()
            .enumerate()
            .find(|(_, img)| img.blob.len() > MAX_IMAGE_BYTES)
        {
            return Err(ClientError::invalid_request(format!(
                "image {} is {} bytes (max {})",
                i,
                img.blob.len(),
                MAX_IMAGE_BYTES
            )));
        }
        Ok(())
    }

    fn build_form(images: &[EncodedImage], context: &str) -> ClientResult<Form> {
        let context = match context.trim() {
            "" => NO_CONTEXT,
            trimmed => trimmed,
        };

        let mut form = Form::new().text("context", context.to_string());
        for (i, image) in images.iter().enumerate() {
            let part = Part::bytes(image.blob.clone())
                .file_name(image.file_name(i))
                .mime_str(image.mime.as_str())?;
            form = form.part("files", part);
        }
        Ok(form)
    }

    async fn post_once(
        &self,
        url: &str,
        images: &[EncodedImage],
        context: &str,
    ) -> ClientResult<AnalysisResponse> {
        let form = Self::build_form(images, context)?;

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify_transport(e))?;

        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
                detail: error_detail(status, &body),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::malformed(e.to_string()))
    }

    fn classify_transport(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.config.timeout)
        } else if e.is_connect() {
            ClientError::Unreachable(e.to_string())
        } else {
            ClientError::Network(e)
        }
    }
}

#[async_trait]
impl EmotionClassifier for ClassifierClient {
    async fn classify(
        &self,
        images: &[EncodedImage],
        context: &str,
    ) -> ClientResult<AnalysisResponse> {
        Self::validate(images)?;

        let url = format!("{}/analyze", self.config.base_url);
        debug!(url = %url, images = images.len(), "Sending emotion analysis request");

        let mut attempt = 0;
        loop {
            match self.post_once(&url, images, context).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Emotion request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Human-readable detail from an error body.
///
/// Understands `{"detail": ...}` payloads; anything else is echoed, cut short.
fn error_detail(status: StatusCode, body: &[u8]) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) {
        match map.get("detail") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text.chars().take(MAX_DETAIL_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emo_models::{EmotionLabel, ImageMime};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image(size: usize) -> EncodedImage {
        EncodedImage::new(vec![7u8; size], ImageMime::Webp, 128, 80)
    }

    fn client(server: &MockServer, timeout: Duration) -> ClassifierClient {
        ClassifierClient::new(ClientConfig {
            base_url: server.uri(),
            timeout,
            max_retries: 0,
        })
        .unwrap()
    }

    fn analysis_json() -> serde_json::Value {
        serde_json::json!({
            "images": [
                {"index": 0, "top3": [
                    {"label": "happy", "confidence": 0.7},
                    {"label": "neutral", "confidence": 0.2},
                    {"label": "surprise", "confidence": 0.05}
                ]}
            ],
            "top3_aggregate": [
                {"label": "happy", "confidence": 0.7},
                {"label": "neutral", "confidence": 0.2},
                {"label": "surprise", "confidence": 0.05}
            ],
            "gemini_feedback": "The audience is enjoying it.",
            "timings": {"preprocess_ms": 3.1, "tf_ms": 12.0}
        })
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_error_detail_parsing() {
        let s = StatusCode::BAD_REQUEST;
        assert_eq!(error_detail(s, br#"{"detail":"Invalid image"}"#), "Invalid image");
        assert_eq!(
            error_detail(s, br#"{"detail":[{"loc":["body"]}]}"#),
            r#"[{"loc":["body"]}]"#
        );
        assert_eq!(error_detail(s, b"plain failure"), "plain failure");
        assert_eq!(error_detail(s, b""), "Bad Request");
    }

    #[tokio::test]
    async fn test_classify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server, Duration::from_secs(5))
            .classify(&[image(64)], "  ")
            .await
            .unwrap();

        assert_eq!(response.images.len(), 1);
        assert_eq!(response.dominant().unwrap().label, EmotionLabel::Happy);
        assert_eq!(response.gemini_feedback, "The audience is enjoying it.");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"context\""));
        assert!(body.contains(NO_CONTEXT));
        assert!(body.contains("filename=\"face_0.webp\""));
        assert!(body.contains("image/webp"));
    }

    #[tokio::test]
    async fn test_server_error_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(413).set_body_json(
                serde_json::json!({"detail": "Image too large (max 307200 bytes)"}),
            ))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .classify(&[image(64)], "standup")
            .await
            .unwrap_err();

        match err {
            ClientError::Server { status, detail } => {
                assert_eq!(status, 413);
                assert!(detail.starts_with("Image too large"));
            }
            other => panic!("expected Server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .classify(&[image(64)], "ctx")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(analysis_json())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_millis(100))
            .classify(&[image(64)], "ctx")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable() {
        // Grab a free port, then close it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ClassifierClient::new(ClientConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            timeout: Duration::from_secs(2),
            max_retries: 0,
        })
        .unwrap();

        let err = client.classify(&[image(64)], "ctx").await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_retries_transient_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
            .mount(&server)
            .await;

        let client = ClassifierClient::new(ClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
        })
        .unwrap();

        assert!(client.classify(&[image(64)], "ctx").await.is_ok());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_validation_before_network() {
        let server = MockServer::start().await;
        let client = client(&server, Duration::from_secs(5));

        let too_many: Vec<EncodedImage> = (0..MAX_BATCH + 1).map(|_| image(10)).collect();
        for batch in [vec![], too_many, vec![image(MAX_IMAGE_BYTES + 1)]] {
            let err = tokio_test::assert_err!(client.classify(&batch, "ctx").await);
            assert!(matches!(err, ClientError::InvalidRequest(_)));
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
