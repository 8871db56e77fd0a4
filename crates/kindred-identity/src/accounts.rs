//! The `accounts` table.

use crate::{generate_session_token, token_digest, AccountError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Longest accepted email or display name.
const MAX_FIELD_LEN: usize = 256;

/// An account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: String,
}

/// A freshly created account together with its one-time visible token.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub account: Account,
    pub token: String,
}

/// Creates an account and issues its session token.
///
/// # Errors
///
/// Returns `AccountError::Invalid` for an empty or oversized field,
/// `AccountError::DuplicateEmail` if the email is taken.
pub fn create_account(
    conn: &Connection,
    email: &str,
    display_name: &str,
) -> Result<NewAccount, AccountError> {
    let email = email.trim().to_ascii_lowercase();
    let display_name = display_name.trim();
    if email.is_empty() || email.len() > MAX_FIELD_LEN || !email.contains('@') {
        return Err(AccountError::Invalid("email"));
    }
    if display_name.is_empty() || display_name.len() > MAX_FIELD_LEN {
        return Err(AccountError::Invalid("name"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let token = generate_session_token();

    let inserted = conn.execute(
        "INSERT INTO accounts (id, email, display_name, token_hash) VALUES (?1, ?2, ?3, ?4)",
        params![id, email, display_name, token_digest(&token)],
    );
    if let Err(rusqlite::Error::SqliteFailure(code, _)) = &inserted {
        if code.code == rusqlite::ffi::ErrorCode::ConstraintViolation {
            return Err(AccountError::DuplicateEmail(email));
        }
    }
    inserted?;

    tracing::info!(account_id = %id, "account created");

    let account = get_account(conn, &id)?;
    Ok(NewAccount { account, token })
}

/// Retrieves an account by id.
pub fn get_account(conn: &Connection, id: &str) -> Result<Account, AccountError> {
    conn.query_row(
        "SELECT id, email, display_name, created_at FROM accounts WHERE id = ?1",
        [id],
        map_row_to_account,
    )
    .optional()?
    .ok_or_else(|| AccountError::NotFound(id.to_string()))
}

/// Resolves a bearer token to its account.
///
/// Returns `Ok(None)` when no account holds the token.
pub fn find_account_by_token(
    conn: &Connection,
    token: &str,
) -> Result<Option<Account>, AccountError> {
    let account = conn
        .query_row(
            "SELECT id, email, display_name, created_at FROM accounts WHERE token_hash = ?1",
            [token_digest(token)],
            map_row_to_account,
        )
        .optional()?;
    Ok(account)
}

/// Deletes an account. Friends and their messages go with it.
pub fn delete_account(conn: &Connection, id: &str) -> Result<(), AccountError> {
    let count = conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
    if count == 0 {
        return Err(AccountError::NotFound(id.to_string()));
    }
    tracing::info!(account_id = %id, "account deleted");
    Ok(())
}

fn map_row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        created_at: row.get(3)?,
    })
}
