use crate::AudioClip;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One conversational turn sent to the reply service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub friend_id: String,
    /// Empty for the greeting turn.
    pub transcript: String,
    pub users_name: String,
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("Could not reach the reply service: {0}")]
    Http(#[from] reqwest::Error),

    /// The service's `{message}`, verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

/// Something that turns a transcript into the friend's spoken answer.
#[async_trait]
pub trait ReplySource: Send + Sync {
    async fn reply(&self, request: ReplyRequest) -> Result<AudioClip, ReplyError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReplyBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    friend_id: &'a str,
    user_message: &'a str,
    users_name: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`ReplySource`] backed by the server's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpReplyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpReplyClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ReplyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl ReplySource for HttpReplyClient {
    async fn reply(&self, request: ReplyRequest) -> Result<AudioClip, ReplyError> {
        let body = GenerateReplyBody {
            kind: "response",
            friend_id: &request.friend_id,
            user_message: &request.transcript,
            users_name: &request.users_name,
        };
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.message)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });
            tracing::warn!(status = status.as_u16(), %message, "reply request rejected");
            return Err(ReplyError::Rejected {
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
        let bytes = response.bytes().await?.to_vec();
        Ok(AudioClip {
            content_type,
            bytes,
        })
    }
}
