//! OpenAI-compatible HTTP client.
//!
//! Speaks `POST {base}/chat/completions` and `POST {base}/images/generations`.
//! Any provider exposing the same shapes (proxies, local gateways) works by
//! pointing `base_url` at it.

use crate::image::{GeneratedImage, ImageBackend};
use crate::{ChatBackend, ChatRequest, GenerationConfig, GenerationError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

impl OpenAiClient {
    /// Builds a client with its own connection pool and request timeout.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Config` when no API key is set, and
    /// `GenerationError::Http` if the TLS backend cannot be initialized.
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Config(
                "api_key is empty; set generation.api_key or OPENAI_API_KEY".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// The underlying HTTP client, reused for downloading image URLs.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = provider_error_message(&text).unwrap_or_else(|| status.to_string());
        tracing::warn!(status = status.as_u16(), path, %message, "generation provider rejected request");
        Err(GenerationError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pulls `error.message` out of an OpenAI-style error body.
fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError> {
        let mut body = json!({
            "model": self.config.chat_model,
            "messages": [{"role": "system", "content": request.system_prompt}],
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let completion: ChatCompletion = self.post("chat/completions", body).await?.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::Empty)
    }
}

#[async_trait]
impl ImageBackend for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let body = json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "n": 1,
            "quality": "standard",
            "size": self.config.image_size,
            "response_format": "b64_json",
        });

        let images: ImagesResponse = self.post("images/generations", body).await?.json().await?;
        let datum = images.data.into_iter().next().ok_or(GenerationError::Empty)?;

        match (datum.b64_json, datum.url) {
            (Some(b64), _) if !b64.is_empty() => Ok(GeneratedImage::Base64(b64)),
            (_, Some(url)) if !url.is_empty() => Ok(GeneratedImage::Url(url)),
            _ => Err(GenerationError::Empty),
        }
    }
}
