//! Friend generation and loading.

use crate::api::{with_conn, ApiError, FRIEND_NOT_FOUND};
use crate::middleware::{enforce_rate_limit, AccountContext, Caller};
use crate::AppState;
use axum::extract::{Extension, Json, Path};
use kindred_friends::{create_friend, get_owned_friend, latest_friend, NewFriend};
use kindred_generation::persona::{parse_persona, persona_prompt, profile_image_prompt};
use kindred_generation::ChatRequest;
use kindred_types::Friend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A freshly generated friend. `id` is absent for anonymous callers, whose
/// friend is not stored server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFriend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub voice: String,
    pub image_url: String,
}

/// Handler for `POST /api/friend`.
pub async fn create_friend_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<GeneratedFriend>, ApiError> {
    generate_friend(&state, &caller).await.map(Json)
}

/// Runs the whole generation flow: quota, persona, portrait, durable image,
/// and (for account holders) the friend row.
pub(crate) async fn generate_friend(
    state: &Arc<AppState>,
    caller: &Caller,
) -> Result<GeneratedFriend, ApiError> {
    enforce_rate_limit(&state.rate_limiter, caller)?;

    let content = state.chat.complete(ChatRequest::json(persona_prompt())).await?;
    let persona = parse_persona(&content, &mut rand::thread_rng())?;

    let image = state.images.generate(&profile_image_prompt(&persona)).await?;
    let bytes = image.into_bytes(&state.http).await?;

    let friend_id = Uuid::new_v4().to_string();
    let stored_image = state.image_store.save_friend_image(&friend_id, &bytes).await?;

    let Some(account) = caller.account() else {
        tracing::info!(name = %persona.name, "generated friend for anonymous caller");
        return Ok(GeneratedFriend {
            id: None,
            name: persona.name,
            description: persona.description,
            voice: persona.voice,
            image_url: stored_image.url,
        });
    };

    let params = NewFriend {
        id: friend_id,
        account_id: account.id.clone(),
        name: persona.name,
        description: persona.description,
        gender: persona.gender,
        voice: persona.voice,
        image_url: stored_image.url.clone(),
        image_path: Some(stored_image.path.clone()),
    };
    let created = with_conn(state, move |conn| Ok(create_friend(conn, &params)?)).await;
    let stored = match created {
        Ok(stored) => stored,
        Err(e) => {
            state.image_store.remove(&stored_image.path).await;
            return Err(e);
        }
    };

    tracing::info!(
        friend_id = %stored.friend.id,
        account_id = %account.id,
        voice = stored.friend.voice.as_deref().unwrap_or_default(),
        "generated friend"
    );
    Ok(GeneratedFriend {
        id: Some(stored.friend.id),
        name: stored.friend.name,
        description: stored.friend.description,
        voice: stored.friend.voice.unwrap_or_default(),
        image_url: stored.friend.image_url,
    })
}

/// Handler for `GET /api/friend`: the caller's most recent friend.
pub async fn current_friend_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Friend>, ApiError> {
    let account_id = caller.require_account()?.id.clone();
    let stored = with_conn(&state, move |conn| Ok(latest_friend(conn, &account_id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound(FRIEND_NOT_FOUND.to_string()))?;
    Ok(Json(stored.friend))
}

/// Handler for `GET /api/friends/{friendId}`.
pub async fn get_friend_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AccountContext(account)): Extension<AccountContext>,
    Path(friend_id): Path<String>,
) -> Result<Json<Friend>, ApiError> {
    let stored = with_conn(&state, move |conn| {
        Ok(get_owned_friend(conn, &account.id, &friend_id)?)
    })
    .await?;
    Ok(Json(stored.friend))
}
