//! Shared plumbing for the API handlers: the error type every handler
//! returns, JSON body parsing, and the blocking database helper.

use crate::image_store::ImageStoreError;
use crate::AppState;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kindred_friends::FriendError;
use kindred_generation::{GenerationError, OUT_OF_CREDITS_MESSAGE};
use kindred_identity::AccountError;
use kindred_voice::SpeechError;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const FRIEND_NOT_FOUND: &str = "Friend not found";

/// API error type mapping to HTTP status codes.
///
/// Every variant renders as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// A generation or speech provider failed. `status` is the provider's
    /// own HTTP status, when it returned one. Provider auth and lookup
    /// failures are ours, not the caller's, and surface as 502.
    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream { status, .. } => status
                .filter(|s| (400..=599).contains(s))
                .filter(|s| !matches!(s, 401 | 403 | 404))
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response =
            (status, Json(serde_json::json!({ "message": message }))).into_response();
        if let ApiError::RateLimited { retry_after, .. } = &self {
            let rounded_up = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let secs = rounded_up.max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<FriendError> for ApiError {
    fn from(e: FriendError) -> Self {
        match e {
            FriendError::NotFound(_) => ApiError::NotFound(FRIEND_NOT_FOUND.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::DuplicateEmail(_) => ApiError::Conflict(e.to_string()),
            AccountError::Invalid(_) => ApiError::BadRequest(e.to_string()),
            AccountError::NotFound(_) => ApiError::Unauthorized,
            AccountError::Database(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        tracing::warn!(error = %e, "generation provider failed");
        ApiError::Upstream {
            status: e.upstream_status(),
            message: OUT_OF_CREDITS_MESSAGE.to_string(),
        }
    }
}

impl From<SpeechError> for ApiError {
    fn from(e: SpeechError) -> Self {
        tracing::warn!(error = %e, "speech provider failed");
        let message = match e {
            SpeechError::EmptyAudio => e.to_string(),
            _ => OUT_OF_CREDITS_MESSAGE.to_string(),
        };
        ApiError::Upstream {
            status: e.upstream_status(),
            message,
        }
    }
}

impl From<ImageStoreError> for ApiError {
    fn from(e: ImageStoreError) -> Self {
        match e {
            ImageStoreError::UnsupportedFormat => {
                tracing::warn!(error = %e, "image provider returned unusable data");
                ApiError::Upstream {
                    status: None,
                    message: OUT_OF_CREDITS_MESSAGE.to_string(),
                }
            }
            ImageStoreError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Parses a JSON request body, reporting failures as `{message}` 400s.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
}

/// Runs `f` with a pooled connection on the blocking thread pool.
pub(crate) async fn with_conn<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ApiError::Internal(format!("db connection failed: {}", e)))?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("task join error: {}", e)))?
}
