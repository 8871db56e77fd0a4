//! Spoken replies.
//!
//! One turn: load the friend and its history, ask the chat model for the
//! friend's answer, synthesize it in the friend's voice, then append the
//! user line and the friend line together. Nothing is persisted unless the
//! audio was produced.

use crate::api::{with_conn, ApiError};
use crate::AppState;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use kindred_friends::{append_turn, get_owned_friend};
use kindred_generation::persona::reply_prompt;
use kindred_generation::{ChatRequest, GenerationError, ReplyContext};
use kindred_identity::Account;
use kindred_voice::fit_for_speech;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const REPLY_IN_PROGRESS: &str = "A reply is already in progress for this friend.";

/// Friends that currently have a reply being generated.
#[derive(Clone, Debug, Default)]
pub struct InFlightReplies {
    friends: Arc<Mutex<HashSet<String>>>,
}

impl InFlightReplies {
    /// Marks `friend_id` busy until the returned guard is dropped. Returns
    /// `None` if it already is.
    pub fn try_begin(&self, friend_id: &str) -> Option<ReplyGuard> {
        let mut friends = match self.friends.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !friends.insert(friend_id.to_string()) {
            return None;
        }
        Some(ReplyGuard {
            friends: Arc::clone(&self.friends),
            friend_id: friend_id.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct ReplyGuard {
    friends: Arc<Mutex<HashSet<String>>>,
    friend_id: String,
}

impl Drop for ReplyGuard {
    fn drop(&mut self) {
        let mut friends = match self.friends.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        friends.remove(&self.friend_id);
    }
}

#[derive(Debug, Clone)]
pub struct ReplyInput {
    pub friend_id: String,
    /// Empty for the greeting turn.
    pub user_message: String,
    /// Falls back to the account's display name.
    pub users_name: Option<String>,
}

pub(crate) async fn generate_reply(
    state: &Arc<AppState>,
    account: &Account,
    input: ReplyInput,
) -> Result<Response, ApiError> {
    let _guard = state
        .replies_in_flight
        .try_begin(&input.friend_id)
        .ok_or_else(|| ApiError::Conflict(REPLY_IN_PROGRESS.to_string()))?;

    let account_id = account.id.clone();
    let friend_id = input.friend_id.clone();
    let stored = with_conn(state, move |conn| {
        Ok(get_owned_friend(conn, &account_id, &friend_id)?)
    })
    .await?;
    let friend = stored.friend;

    let voice = friend
        .voice
        .clone()
        .ok_or_else(|| ApiError::Internal(format!("friend {} has no voice", friend.id)))?;
    let users_name = input
        .users_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| account.display_name.clone());
    let user_message = input.user_message.trim().to_string();

    let context = ReplyContext {
        friend_name: &friend.name,
        friend_description: friend.description.as_deref(),
        user_name: &users_name,
        user_message: &user_message,
        history: &friend.messages,
    };
    let greeting = context.is_greeting();
    let raw_reply = state
        .chat
        .complete(ChatRequest::text(reply_prompt(&context)))
        .await?;
    let reply = fit_for_speech(&raw_reply).to_string();
    if reply.is_empty() {
        return Err(GenerationError::Empty.into());
    }

    let speech = state.speech.synthesize(&reply, &voice).await?;

    let friend_id = friend.id.clone();
    let history_len = with_conn(state, move |conn| {
        Ok(append_turn(conn, &friend_id, &user_message, &reply)?)
    })
    .await?;

    tracing::info!(
        friend_id = %friend.id,
        greeting,
        history_len,
        audio_bytes = speech.audio.len(),
        "reply generated"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, speech.content_type)
        .header(header::CONTENT_DISPOSITION, "inline")
        .body(Body::from(speech.audio))
        .map_err(|e| ApiError::Internal(format!("failed to build audio response: {}", e)))
}
