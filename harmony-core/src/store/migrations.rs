//! Versioned schema for the SQLite backend
//!
//! Each migration runs in its own transaction and is recorded in
//! `schema_version`, so `migrate` can be called on every startup.

use super::StoreError;
use crate::types::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

/// Schema version this build expects
pub const SCHEMA_VERSION: i32 = 2;

struct Migration {
    version: i32,
    description: &'static str,
    up_sql: &'static str,
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "accounts, communities and their membership rows",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    id TEXT PRIMARY KEY,
                    display_name TEXT NOT NULL,
                    handle TEXT NOT NULL UNIQUE,
                    mail TEXT NOT NULL UNIQUE,
                    created_at INTEGER NOT NULL
                );

                -- Account side of a membership, keyed by community handle
                CREATE TABLE IF NOT EXISTS account_memberships (
                    account_id TEXT NOT NULL,
                    community_handle TEXT NOT NULL,
                    role TEXT NOT NULL CHECK(role IN ('owner', 'admin', 'member')),
                    PRIMARY KEY (account_id, community_handle),
                    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS communities (
                    id TEXT PRIMARY KEY,
                    display_name TEXT NOT NULL,
                    handle TEXT NOT NULL UNIQUE,
                    image TEXT,
                    owner_handle TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_communities_owner ON communities(owner_handle);

                -- Community side of a membership, keyed by account handle
                CREATE TABLE IF NOT EXISTS community_members (
                    community_id TEXT NOT NULL,
                    account_handle TEXT NOT NULL,
                    role TEXT NOT NULL CHECK(role IN ('owner', 'admin', 'member')),
                    PRIMARY KEY (community_id, account_handle),
                    FOREIGN KEY (community_id) REFERENCES communities(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS account_handle_reservations (
                    display_name TEXT PRIMARY KEY,
                    codes TEXT NOT NULL,                    -- JSON array of issued codes
                    version INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS community_handle_reservations (
                    display_name TEXT PRIMARY KEY,
                    codes TEXT NOT NULL,
                    version INTEGER NOT NULL
                );
            "#,
        },
        Migration {
            version: 2,
            description: "membership repair journal",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS membership_repairs (
                    id TEXT PRIMARY KEY,
                    operation TEXT NOT NULL,
                    community_handle TEXT NOT NULL,
                    account_handle TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_repairs_recorded ON membership_repairs(recorded_at);
            "#,
        },
    ]
}

/// Highest applied version, 0 for a fresh database
pub fn current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, StoreError> {
    let conn = pool.get()?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the database
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), StoreError> {
    let current = current_version(pool)?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "database schema v{} is newer than this build (v{})",
            current, SCHEMA_VERSION
        )));
    }

    let conn = pool.get()?;
    for migration in migrations().into_iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}
