//! Connection pool creation and configuration.

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Upper bound on open connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("could not open database pool: {0}")]
    Open(#[from] r2d2::Error),
}

/// Pragmas applied to each connection as the pool opens it.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
        // In-memory databases cannot use WAL and report "memory".
        if !matches!(mode.as_str(), "wal" | "memory") {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("journal_mode stayed {mode}")),
            ));
        }
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(self.busy_timeout)
    }
}

/// Opens a pool over `db_path`.
///
/// Every connection runs in WAL mode with foreign keys enforced; account
/// deletion depends on `ON DELETE CASCADE` reaching friends and messages.
///
/// `:memory:` works, but each pooled connection then has a private empty
/// database, so tests sharing rows across connections need a real file.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path).with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    );

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_customizer(Box::new(ConnectionPragmas {
            busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
        }))
        .build(manager)?;

    tracing::debug!(path = db_path, max_size = settings.pool_max_size, "opened database pool");
    Ok(pool)
}
