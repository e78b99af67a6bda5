//! OCR Providers
//!
//! Defines the recognizer trait and the HTTP client for the remote OCR
//! service.

use async_trait::async_trait;
use serde::Serialize;

use super::types::{OcrOptions, RawRecognition, Recognition, RecognitionError};
use crate::config::OcrConfig;

/// Text recognizer
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Recognize text in a base64-encoded image
    async fn recognize(&self, image_base64: &str) -> Result<Recognition, RecognitionError>;
}

#[derive(Serialize)]
struct Base64Request<'a> {
    #[serde(rename = "imageBase64")]
    image_base64: &'a str,
    #[serde(flatten)]
    options: &'a OcrOptions,
}

#[derive(Serialize)]
struct UrlRequest<'a> {
    image_url: &'a str,
    #[serde(flatten)]
    options: &'a OcrOptions,
}

/// Client for the remote OCR HTTP service
pub struct RemoteOcrClient {
    http: reqwest::Client,
    base_url: String,
    options: OcrOptions,
}

impl RemoteOcrClient {
    pub fn new(config: &OcrConfig) -> Result<Self, RecognitionError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RecognitionError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            options: OcrOptions {
                lang: config.lang.clone(),
                ..OcrOptions::default()
            },
        })
    }

    /// Replace the request options
    pub fn with_options(mut self, options: OcrOptions) -> Self {
        self.options = options;
        self
    }

    /// Recognize text in an image the service fetches itself
    pub async fn recognize_url(&self, image_url: &str) -> Result<Recognition, RecognitionError> {
        let body = UrlRequest {
            image_url,
            options: &self.options,
        };
        self.post("url", &body).await
    }

    async fn post<B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> Result<Recognition, RecognitionError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RecognitionError::Http(format!("Failed to call {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawRecognition = response
            .json()
            .await
            .map_err(|e| RecognitionError::Malformed(e.to_string()))?;

        let recognition = Recognition::from_raw(raw)?;
        tracing::debug!(boxes = recognition.boxes.len(), "OCR completed");
        Ok(recognition)
    }
}

#[async_trait]
impl Recognizer for RemoteOcrClient {
    fn name(&self) -> &str {
        "remote"
    }

    async fn recognize(&self, image_base64: &str) -> Result<Recognition, RecognitionError> {
        let body = Base64Request {
            image_base64,
            options: &self.options,
        };
        self.post("base64", &body).await
    }
}

/// Scripted recognizer for tests
///
/// Each call pops the next scripted step; once the script is empty every call
/// answers with `fallback`.
#[cfg(test)]
pub(crate) struct MockRecognizer {
    script: parking_lot::Mutex<std::collections::VecDeque<MockStep>>,
    fallback: Vec<String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
pub(crate) struct MockStep {
    pub delay: std::time::Duration,
    pub result: Result<Vec<String>, String>,
}

#[cfg(test)]
impl MockRecognizer {
    pub(crate) fn answering(texts: &[&str]) -> Self {
        Self {
            script: Default::default(),
            fallback: texts.iter().map(|t| t.to_string()).collect(),
            calls: Default::default(),
        }
    }

    pub(crate) fn then(self, delay_ms: u64, result: Result<&[&str], &str>) -> Self {
        self.script.lock().push_back(MockStep {
            delay: std::time::Duration::from_millis(delay_ms),
            result: result
                .map(|texts| texts.iter().map(|t| t.to_string()).collect())
                .map_err(str::to_string),
        });
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Recognizer for MockRecognizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn recognize(&self, _image_base64: &str) -> Result<Recognition, RecognitionError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        let (delay, result) = match step {
            Some(step) => (step.delay, step.result),
            None => (std::time::Duration::ZERO, Ok(self.fallback.clone())),
        };

        tokio::time::sleep(delay).await;

        let texts = result.map_err(|message| RecognitionError::Status { status: 500, message })?;
        Recognition::from_raw(RawRecognition {
            text: super::types::RawText {
                boxes: texts.iter().map(|_| vec![vec![0.0, 0.0]]).collect(),
                scores: vec![1.0; texts.len()],
                texts,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    async fn spawn_fake_ocr(received: Arc<Mutex<Vec<Value>>>) -> String {
        let ok = {
            let received = received.clone();
            move |Json(body): Json<Value>| {
                let received = received.clone();
                async move {
                    received.lock().push(body);
                    Json(json!({
                        "text": {
                            "boxes": [[[0, 0], [5, 0], [5, 5], [0, 5]], [[6, 0], [9, 0], [9, 5], [6, 5]]],
                            "scores": [0.98, 0.91],
                            "texts": ["BATCH", "0042"]
                        }
                    }))
                }
            }
        };

        let app = Router::new()
            .route("/ocr/base64", post(ok.clone()))
            .route("/ocr/url", post(ok))
            .route(
                "/broken/base64",
                post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
            )
            .route(
                "/garbled/base64",
                post(|| async { Json(json!({ "text": { "boxes": [], "scores": [0.5], "texts": [] } })) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> RemoteOcrClient {
        RemoteOcrClient::new(&OcrConfig {
            base_url,
            lang: "en".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_recognize_sends_options_and_joins_text() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_fake_ocr(received.clone()).await;

        let recognition = client(format!("{}/ocr", base)).recognize("aGVsbG8=").await.unwrap();
        assert_eq!(recognition.text(), "BATCH 0042");
        assert_eq!(recognition.boxes[0].coordinates.len(), 4);
        assert!((recognition.boxes[1].score - 0.91).abs() < 1e-9);

        let body = received.lock()[0].clone();
        assert_eq!(body["imageBase64"], "aGVsbG8=");
        assert_eq!(body["lang"], "en");
        assert_eq!(body["det"], true);
        assert_eq!(body["alpha_color"], "(255, 255, 255)");
    }

    #[tokio::test]
    async fn test_recognize_url_posts_image_url() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_fake_ocr(received.clone()).await;

        let recognition = client(format!("{}/ocr", base))
            .recognize_url("http://files/cell.jpg")
            .await
            .unwrap();
        assert_eq!(recognition.text(), "BATCH 0042");
        assert_eq!(received.lock()[0]["image_url"], "http://files/cell.jpg");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let base = spawn_fake_ocr(Arc::new(Mutex::new(Vec::new()))).await;
        let result = client(format!("{}/broken", base)).recognize("eA==").await;
        assert!(matches!(result, Err(RecognitionError::Status { status: 502, .. })));
    }

    #[tokio::test]
    async fn test_misaligned_response_is_malformed() {
        let base = spawn_fake_ocr(Arc::new(Mutex::new(Vec::new()))).await;
        let result = client(format!("{}/garbled", base)).recognize("eA==").await;
        assert!(matches!(result, Err(RecognitionError::Malformed(_))));
    }
}
