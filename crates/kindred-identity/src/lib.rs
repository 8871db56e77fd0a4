//! Accounts and bearer session tokens.
//!
//! Sign-in itself is delegated to an external provider; this crate only keeps
//! the account record and an opaque session token the client presents as
//! `Authorization: Bearer <token>`. Tokens are stored as SHA-256 digests so a
//! leaked database does not leak usable credentials.

mod accounts;

pub use accounts::{
    create_account, delete_account, find_account_by_token, get_account, Account, NewAccount,
};

use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors produced by account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("an account already exists for {0}")]
    DuplicateEmail(String),
    #[error("invalid account field: {0}")]
    Invalid(&'static str),
}

/// Number of random bytes in a session token (hex encoded to twice as many chars).
const TOKEN_BYTES: usize = 32;

/// Generates a fresh random session token.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Digest under which a session token is stored.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
