use crate::{SpeechConfig, SpeechError};
use async_trait::async_trait;
use kindred_types::voice::gender_of_voice;
use serde_json::json;
use std::time::Duration;

/// Longest text the speech provider accepts in one request.
pub const MAX_TTS_INPUT_CHARS: usize = 2000;

/// Rendered audio and its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub content_type: String,
    pub audio: Vec<u8>,
}

/// Something that reads text aloud in a given voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedSpeech, SpeechError>;
}

/// Trims `text` to at most [`MAX_TTS_INPUT_CHARS`] characters.
///
/// Cuts at the last sentence end inside the limit when there is one, so the
/// friend does not stop mid-word.
pub fn fit_for_speech(text: &str) -> &str {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(MAX_TTS_INPUT_CHARS) else {
        return text;
    };
    let head = &text[..cut];
    match head.rfind(['.', '!', '?']) {
        Some(end) => &head[..=end],
        None => head,
    }
}

/// Client for Deepgram's `/speak` endpoint.
#[derive(Debug, Clone)]
pub struct DeepgramClient {
    http: reqwest::Client,
    config: SpeechConfig,
}

impl DeepgramClient {
    /// # Errors
    ///
    /// Returns `SpeechError::Config` when no API key is set.
    pub fn new(config: SpeechConfig) -> Result<Self, SpeechError> {
        if config.api_key.trim().is_empty() {
            return Err(SpeechError::Config(
                "api_key is empty; set speech.api_key or DEEPGRAM_API_KEY".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl SpeechSynthesizer for DeepgramClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedSpeech, SpeechError> {
        if gender_of_voice(voice).is_none() {
            return Err(SpeechError::UnknownVoice(voice.to_string()));
        }

        let url = format!("{}/speak", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .query(&[("model", voice)])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.config.api_key),
            )
            .json(&json!({ "text": fit_for_speech(text) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("err_msg")
                        .or_else(|| v.get("message"))
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(status = status.as_u16(), voice, %message, "speech provider rejected request");
            return Err(SpeechError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }

        tracing::debug!(voice, bytes = audio.len(), "speech synthesized");
        Ok(SynthesizedSpeech {
            content_type,
            audio,
        })
    }
}
