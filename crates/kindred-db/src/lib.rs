//! Database layer for Kindred.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Accounts, friends and friend messages are all
//! created through the versioned migrations in this crate.
//!
//! Friend message history is stored one row per message with a per-friend
//! `position`, so appending a conversation turn is a pair of inserts inside a
//! single transaction rather than a read-modify-write of a JSON column.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
