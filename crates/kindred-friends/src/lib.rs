//! Friend persistence for Kindred.
//!
//! Implements the friend session store: creating a friend for an account,
//! loading it back with its message history, appending conversation turns,
//! and the per-account statistics shown on the account screen.
//!
//! A friend's history is append-only and always alternates user and friend
//! lines. [`append_turn`] is the only write path for messages and inserts
//! both lines of a turn in one immediate transaction, so two overlapping
//! turns can never interleave or lose each other's lines.

use kindred_types::{AccountStats, ChatMessage, Friend, Gender, MessageRole};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during friend operations.
#[derive(Debug, Error)]
pub enum FriendError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("friend not found: {0}")]
    NotFound(String),
    #[error("corrupt friend record: {0}")]
    Corrupt(String),
}

/// Parameters for creating a new friend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFriend {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub description: Option<String>,
    pub gender: Gender,
    pub voice: String,
    pub image_url: String,
    /// Local path of the stored profile image, if it lives on this server.
    pub image_path: Option<String>,
}

/// A friend row together with the columns the client never sees.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFriend {
    pub friend: Friend,
    pub account_id: String,
    pub gender: Gender,
    pub image_path: Option<String>,
    pub created_at: String,
}

const FRIEND_COLUMNS: &str =
    "id, account_id, name, description, gender, voice, image_url, image_path, created_at";

/// Creates a new friend with an empty history.
pub fn create_friend(conn: &Connection, params: &NewFriend) -> Result<StoredFriend, FriendError> {
    conn.execute(
        "INSERT INTO friends (
            id, account_id, name, description, gender, voice, image_url, image_path
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            params.id,
            params.account_id,
            params.name,
            params.description,
            params.gender.as_str(),
            params.voice,
            params.image_url,
            params.image_path,
        ],
    )?;

    tracing::info!(
        friend_id = %params.id,
        account_id = %params.account_id,
        "friend created"
    );

    get_friend(conn, &params.id)
}

/// Retrieves a friend and its full history by id, regardless of owner.
pub fn get_friend(conn: &Connection, friend_id: &str) -> Result<StoredFriend, FriendError> {
    let mut stored = conn
        .query_row(
            &format!("SELECT {FRIEND_COLUMNS} FROM friends WHERE id = ?1"),
            [friend_id],
            map_row_to_friend,
        )
        .optional()?
        .ok_or_else(|| FriendError::NotFound(friend_id.to_string()))?;
    stored.friend.messages = list_messages(conn, friend_id)?;
    Ok(stored)
}

/// Retrieves a friend only if it belongs to `account_id`.
///
/// A friend owned by someone else is reported as `NotFound`, the same as a
/// friend that does not exist.
pub fn get_owned_friend(
    conn: &Connection,
    account_id: &str,
    friend_id: &str,
) -> Result<StoredFriend, FriendError> {
    let stored = get_friend(conn, friend_id)?;
    if stored.account_id != account_id {
        return Err(FriendError::NotFound(friend_id.to_string()));
    }
    Ok(stored)
}

/// The account's current friend: the most recently created one.
pub fn latest_friend(
    conn: &Connection,
    account_id: &str,
) -> Result<Option<StoredFriend>, FriendError> {
    let stored = conn
        .query_row(
            &format!(
                "SELECT {FRIEND_COLUMNS} FROM friends
                 WHERE account_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1"
            ),
            [account_id],
            map_row_to_friend,
        )
        .optional()?;

    match stored {
        Some(mut stored) => {
            stored.friend.messages = list_messages(conn, &stored.friend.id)?;
            Ok(Some(stored))
        }
        None => Ok(None),
    }
}

/// Returns a friend's history, oldest first.
pub fn list_messages(conn: &Connection, friend_id: &str) -> Result<Vec<ChatMessage>, FriendError> {
    let mut stmt = conn.prepare(
        "SELECT role, message FROM friend_messages WHERE friend_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map([friend_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (role, message) = row?;
        let role = MessageRole::parse(&role)
            .ok_or_else(|| FriendError::Corrupt(format!("message role '{role}'")))?;
        messages.push(ChatMessage { role, message });
    }
    Ok(messages)
}

/// Appends one conversation turn (the user's line, then the friend's reply).
///
/// Both rows are written in a single immediate transaction: either the whole
/// turn lands or nothing does. Returns the new history length.
pub fn append_turn(
    conn: &mut Connection,
    friend_id: &str,
    user_line: &str,
    friend_line: &str,
) -> Result<usize, FriendError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let next_position: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM friend_messages WHERE friend_id = ?1",
            [friend_id],
            |row| row.get(0),
        )?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM friends WHERE id = ?1)",
        [friend_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(FriendError::NotFound(friend_id.to_string()));
    }

    let mut insert = tx.prepare(
        "INSERT INTO friend_messages (friend_id, position, role, message) VALUES (?1, ?2, ?3, ?4)",
    )?;
    insert.execute(params![
        friend_id,
        next_position,
        MessageRole::User.as_str(),
        user_line
    ])?;
    insert.execute(params![
        friend_id,
        next_position + 1,
        MessageRole::Friend.as_str(),
        friend_line
    ])?;
    drop(insert);

    tx.commit()?;

    let length = (next_position + 2) as usize;
    tracing::debug!(friend_id, length, "conversation turn appended");
    Ok(length)
}

/// Totals over every friend the account has made.
pub fn account_stats(conn: &Connection, account_id: &str) -> Result<AccountStats, FriendError> {
    let (total_friends, total_messages): (i64, i64) = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM friends WHERE account_id = ?1),
            (SELECT COUNT(*) FROM friend_messages m
                JOIN friends f ON f.id = m.friend_id
                WHERE f.account_id = ?1)",
        [account_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(AccountStats {
        total_messages: total_messages as u64,
        total_friends: total_friends as u64,
    })
}

/// Local image paths of every friend owned by the account.
///
/// Used to clean up stored images before the account row is deleted.
pub fn image_paths_for_account(
    conn: &Connection,
    account_id: &str,
) -> Result<Vec<String>, FriendError> {
    let mut stmt = conn.prepare(
        "SELECT image_path FROM friends WHERE account_id = ?1 AND image_path IS NOT NULL",
    )?;
    let rows = stmt.query_map([account_id], |row| row.get::<_, String>(0))?;
    let mut paths = Vec::new();
    for row in rows {
        paths.push(row?);
    }
    Ok(paths)
}

fn map_row_to_friend(row: &Row) -> rusqlite::Result<StoredFriend> {
    let gender_str: String = row.get(4)?;
    let gender: Gender = gender_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StoredFriend {
        friend: Friend {
            id: row.get(0)?,
            name: row.get(2)?,
            description: row.get(3)?,
            image_url: row.get(6)?,
            voice: Some(row.get(5)?),
            messages: Vec::new(),
        },
        account_id: row.get(1)?,
        gender,
        image_path: row.get(7)?,
        created_at: row.get(8)?,
    })
}
