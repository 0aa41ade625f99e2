//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply a list of statements atomically.
///
/// The transaction rolls back when dropped without commit.
fn apply(conn: &mut Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.transaction()?;
    for sql in statements {
        tx.execute(sql, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {}", version);
    Ok(())
}

/// Migration to version 1: records and cursor ledger
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Identity is not declared unique: the reconciler removes duplicates
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource TEXT NOT NULL,
            scope TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            parent_id INTEGER REFERENCES records(id) ON DELETE CASCADE,
            json_data TEXT NOT NULL,
            event_slug TEXT,
            subevent_id INTEGER,
            lookup_key TEXT,
            starts_at INTEGER,
            ends_at INTEGER,
            synced_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_records_identity ON records(resource, scope, remote_id)",
        "CREATE INDEX IF NOT EXISTS idx_records_parent ON records(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_records_lookup ON records(resource, lookup_key)",
        "CREATE TABLE IF NOT EXISTS sync_cursors (
            resource TEXT NOT NULL,
            scope TEXT NOT NULL,
            last_modified TEXT,
            meta TEXT,
            status TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (resource, scope)
        )",
    ];

    apply(conn, 1, &statements)
}

/// Migration to version 2: retention schedule
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let statements = [
        "ALTER TABLE records ADD COLUMN delete_after INTEGER",
        "CREATE INDEX IF NOT EXISTS idx_records_delete_after ON records(resource, scope, delete_after)",
    ];

    apply(conn, CURRENT_VERSION, &statements)
}
