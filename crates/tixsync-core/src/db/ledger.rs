//! Sync cursor ledger

use crate::error::Result;
use crate::models::{CursorEntry, CursorStatus, SyncCursor, SyncScope};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection};

/// Cursor bookkeeping, one row per scope.
pub struct CursorLedger<'a> {
    conn: &'a Connection,
}

impl<'a> CursorLedger<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_status(raw: Option<String>) -> Option<CursorStatus> {
        let raw = raw?;
        match raw.parse() {
            Ok(status) => Some(status),
            Err(error) => {
                tracing::warn!("Ignoring unreadable cursor status: {}", error);
                None
            }
        }
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CursorEntry> {
        Ok(CursorEntry {
            scope: SyncScope::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
            cursor: SyncCursor {
                last_modified: row.get(2)?,
                meta: row.get(3)?,
                status: Self::parse_status(row.get(4)?),
            },
            updated_at: row.get(5)?,
        })
    }

    /// Get the cursor for a scope
    pub fn get(&self, scope: &SyncScope) -> Result<Option<SyncCursor>> {
        let result = self.conn.query_row(
            "SELECT resource, scope, last_modified, meta, status, updated_at
             FROM sync_cursors WHERE resource = ? AND scope = ?",
            params![scope.resource, scope.parent],
            Self::parse_entry,
        );

        match result {
            Ok(entry) => Ok(Some(entry.cursor)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace the cursor for a scope
    pub fn upsert(&self, scope: &SyncScope, cursor: &SyncCursor) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_cursors (resource, scope, last_modified, meta, status, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                scope.resource,
                scope.parent,
                cursor.last_modified,
                cursor.meta,
                cursor.status.as_ref().map(ToString::to_string),
                unix_millis_now(),
            ],
        )?;
        Ok(())
    }

    /// Delete the cursor for a scope. Returns whether one existed.
    pub fn delete(&self, scope: &SyncScope) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM sync_cursors WHERE resource = ? AND scope = ?",
            params![scope.resource, scope.parent],
        )?;
        Ok(deleted > 0)
    }

    /// All cursors, ordered by scope
    pub fn list(&self) -> Result<Vec<CursorEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT resource, scope, last_modified, meta, status, updated_at
             FROM sync_cursors ORDER BY scope, resource",
        )?;
        let entries = stmt
            .query_map([], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Delete cursors whose resource name starts with `resource_prefix`,
    /// limited to one parent key when given.
    pub fn clear(&self, parent: Option<&str>, resource_prefix: &str) -> Result<usize> {
        let pattern = format!("{}%", escape_like(resource_prefix));
        let deleted = match parent {
            Some(parent) => self.conn.execute(
                "DELETE FROM sync_cursors WHERE scope = ? AND resource LIKE ? ESCAPE '\\'",
                params![parent, pattern],
            )?,
            None => self.conn.execute(
                "DELETE FROM sync_cursors WHERE resource LIKE ? ESCAPE '\\'",
                params![pattern],
            )?,
        };
        Ok(deleted)
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
