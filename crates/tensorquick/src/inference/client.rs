//! Calls to deployed inference endpoints.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;

use crate::error::JobError;
use crate::sanitize::redact_url;

/// Maximum length of a response body quoted in an error.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Raw image returned by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl GeneratedImage {
    pub fn extension(&self) -> &'static str {
        extension_from_content_type(self.content_type.as_deref())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

/// Something that turns a prompt into an image.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, endpoint: &str, prompt: &str) -> Result<GeneratedImage, JobError>;
}

/// POSTs `{"prompt": ...}` as JSON and returns the response body.
pub struct HttpInferenceBackend {
    client: Client,
}

impl HttpInferenceBackend {
    pub fn new(timeout: Duration) -> Result<Self, JobError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JobError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn generate(&self, endpoint: &str, prompt: &str) -> Result<GeneratedImage, JobError> {
        debug!("POST {}", redact_url(endpoint));

        let response = self
            .client
            .post(endpoint)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| JobError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Request(format!(
                "HTTP {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| JobError::Request(e.without_url().to_string()))?;

        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

/// File extension for an image content type. Unknown types are saved as jpg.
pub fn extension_from_content_type(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "jpg",
    }
}
