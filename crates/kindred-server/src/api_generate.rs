//! `POST /api/generate`: the single endpoint that either generates a friend
//! or produces a friend's spoken reply, selected by `type`.

use crate::api::{parse_json, ApiError};
use crate::api_friends::generate_friend;
use crate::api_reply::{generate_reply, ReplyInput};
use crate::middleware::Caller;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    friend_id: Option<String>,
    user_message: Option<String>,
    users_name: Option<String>,
}

/// Handler for `POST /api/generate`.
pub async fn generate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: GenerateRequest = parse_json(&body)?;

    match request.kind.as_deref() {
        Some("friend") => {
            let friend = generate_friend(&state, &caller).await?;
            Ok(Json(friend).into_response())
        }
        Some("response") => {
            let account = caller.require_account()?;
            let friend_id = request
                .friend_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::BadRequest("friendId is required".to_string()))?;
            let input = ReplyInput {
                friend_id,
                user_message: request.user_message.unwrap_or_default(),
                users_name: request.users_name,
            };
            generate_reply(&state, account, input).await
        }
        _ => Err(ApiError::BadRequest("Invalid request type".to_string())),
    }
}
