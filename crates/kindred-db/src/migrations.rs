//! Embedded, versioned schema migrations.
//!
//! Each migration is a SQL file compiled into the binary. Names of applied
//! migrations live in `_kindred_migrations`; a migration and its tracking row
//! commit together.

use rusqlite::Connection;
use std::collections::HashSet;
use thiserror::Error;

/// `(name, sql)` pairs in application order. Append only.
const MIGRATIONS: &[(&str, &str)] = &[
    ("000_init", include_str!("migrations/000_init.sql")),
    ("001_accounts", include_str!("migrations/001_accounts.sql")),
    ("002_friends", include_str!("migrations/002_friends.sql")),
    (
        "003_friend_messages",
        include_str!("migrations/003_friend_messages.sql"),
    ),
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("could not read applied migrations: {0}")]
    Tracking(#[source] rusqlite::Error),
    #[error("migration {name} failed: {source}")]
    Apply {
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

/// Applies every migration not yet recorded and returns how many ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_pending(conn, MIGRATIONS)
}

fn applied_names(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    conn.execute_batch(include_str!("migrations/000_init.sql"))?;
    let mut stmt = conn.prepare("SELECT name FROM _kindred_migrations")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

fn apply_pending(
    conn: &Connection,
    migrations: &[(&'static str, &'static str)],
) -> Result<usize, MigrationError> {
    let done = applied_names(conn).map_err(MigrationError::Tracking)?;

    let pending: Vec<_> = migrations
        .iter()
        .filter(|(name, _)| !done.contains(*name))
        .collect();

    for &&(name, sql) in &pending {
        tracing::info!(migration = name, "applying migration");
        let apply = || -> rusqlite::Result<()> {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO _kindred_migrations (name) VALUES (?1)", [name])?;
            tx.commit()
        };
        apply().map_err(|source| MigrationError::Apply { name, source })?;
    }

    Ok(pending.len())
}
