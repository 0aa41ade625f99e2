//! Record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{LocalRecord, RecordDraft, RecordFields, RemoteId, SyncScope};
use crate::util::unix_millis_now;
use rusqlite::{params, params_from_iter, Connection};

const RECORD_COLUMNS: &str = "id, resource, scope, remote_id, parent_id, json_data, event_slug, \
     subevent_id, lookup_key, starts_at, ends_at, delete_after, synced_at";

/// Trait for record storage operations
pub trait RecordRepository {
    /// All identities currently stored for a scope
    fn known_identities(&self, scope: &SyncScope) -> Result<HashSet<RemoteId>>;

    /// Records matching any of the given identities. May contain duplicates.
    fn find_by_identities(&self, scope: &SyncScope, ids: &[RemoteId]) -> Result<Vec<LocalRecord>>;

    /// Oldest record with the given identity
    fn find(&self, scope: &SyncScope, id: &RemoteId) -> Result<Option<LocalRecord>>;

    /// Get a record by surrogate key
    fn get(&self, id: i64) -> Result<Option<LocalRecord>>;

    /// Insert a record
    fn insert(&self, scope: &SyncScope, draft: &RecordDraft) -> Result<LocalRecord>;

    /// Replace a record's payload and derived columns; resets its retention schedule
    fn update(&self, id: i64, draft: &RecordDraft) -> Result<()>;

    /// Delete a record; children cascade
    fn delete(&self, id: i64) -> Result<()>;

    /// Delete many records by surrogate key
    fn delete_many(&self, ids: &[i64]) -> Result<usize>;

    /// Child records of a given resource
    fn children(&self, parent_id: i64, resource: &str) -> Result<Vec<LocalRecord>>;

    /// List records of a scope, oldest first
    fn list(&self, scope: &SyncScope, limit: usize, offset: usize) -> Result<Vec<LocalRecord>>;

    /// Number of records in a scope
    fn count(&self, scope: &SyncScope) -> Result<usize>;

    /// Records of a resource with the given lookup key
    fn find_by_lookup_key(&self, resource: &str, key: &str) -> Result<Vec<LocalRecord>>;

    /// Store a retention horizon
    fn set_delete_after(&self, id: i64, delete_after: i64) -> Result<()>;

    /// Records whose retention schedule still needs computing
    fn pending_retention(&self, scope: &SyncScope) -> Result<Vec<LocalRecord>>;

    /// Surrogate keys of records whose horizon has passed
    fn overdue(&self, scope: &SyncScope, now: i64, limit: usize) -> Result<Vec<i64>>;

    /// Delete every record stored under a parent key
    fn delete_by_parent_key(&self, parent: &str) -> Result<usize>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalRecord> {
        let remote_id: String = row.get(3)?;
        Ok(LocalRecord {
            id: row.get(0)?,
            resource: row.get(1)?,
            scope: row.get(2)?,
            remote_id: RemoteId::code(remote_id),
            parent_id: row.get(4)?,
            json_data: row.get(5)?,
            fields: RecordFields {
                event_slug: row.get(6)?,
                subevent_id: row.get(7)?,
                lookup_key: row.get(8)?,
                starts_at: row.get(9)?,
                ends_at: row.get(10)?,
            },
            delete_after: row.get(11)?,
            synced_at: row.get(12)?,
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<LocalRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn known_identities(&self, scope: &SyncScope) -> Result<HashSet<RemoteId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT remote_id FROM records WHERE resource = ? AND scope = ?")?;
        let ids = stmt
            .query_map(params![scope.resource, scope.parent], |row| {
                row.get::<_, String>(0).map(RemoteId::code)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn find_by_identities(&self, scope: &SyncScope, ids: &[RemoteId]) -> Result<Vec<LocalRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE resource = ? AND scope = ? AND remote_id IN ({placeholders})
             ORDER BY id"
        );
        let values = [scope.resource.as_str(), scope.parent.as_str()]
            .into_iter()
            .chain(ids.iter().map(RemoteId::as_str));
        self.query_records(&sql, params_from_iter(values))
    }

    fn find(&self, scope: &SyncScope, id: &RemoteId) -> Result<Option<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE resource = ? AND scope = ? AND remote_id = ?
             ORDER BY id LIMIT 1"
        );
        let result = self.conn.query_row(
            &sql,
            params![scope.resource, scope.parent, id.as_str()],
            Self::parse_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: i64) -> Result<Option<LocalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?");
        let result = self.conn.query_row(&sql, params![id], Self::parse_record);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert(&self, scope: &SyncScope, draft: &RecordDraft) -> Result<LocalRecord> {
        let synced_at = unix_millis_now();
        self.conn.execute(
            "INSERT INTO records (resource, scope, remote_id, parent_id, json_data, event_slug,
                 subevent_id, lookup_key, starts_at, ends_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                scope.resource,
                scope.parent,
                draft.remote_id.as_str(),
                draft.parent_id,
                draft.json_data,
                draft.fields.event_slug,
                draft.fields.subevent_id,
                draft.fields.lookup_key,
                draft.fields.starts_at,
                draft.fields.ends_at,
                synced_at,
            ],
        )?;

        Ok(LocalRecord {
            id: self.conn.last_insert_rowid(),
            resource: scope.resource.clone(),
            scope: scope.parent.clone(),
            remote_id: draft.remote_id.clone(),
            parent_id: draft.parent_id,
            json_data: draft.json_data.clone(),
            fields: draft.fields.clone(),
            delete_after: None,
            synced_at,
        })
    }

    fn update(&self, id: i64, draft: &RecordDraft) -> Result<()> {
        self.conn.execute(
            "UPDATE records SET parent_id = ?, json_data = ?, event_slug = ?, subevent_id = ?,
                 lookup_key = ?, starts_at = ?, ends_at = ?, delete_after = NULL, synced_at = ?
             WHERE id = ?",
            params![
                draft.parent_id,
                draft.json_data,
                draft.fields.event_slug,
                draft.fields.subevent_id,
                draft.fields.lookup_key,
                draft.fields.starts_at,
                draft.fields.ends_at,
                unix_millis_now(),
                id,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM records WHERE id = ?", params![id])?;
        Ok(())
    }

    fn delete_many(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM records WHERE id IN ({placeholders})");
        let deleted = self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(deleted)
    }

    fn children(&self, parent_id: i64, resource: &str) -> Result<Vec<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE parent_id = ? AND resource = ? ORDER BY id"
        );
        self.query_records(&sql, params![parent_id, resource])
    }

    fn list(&self, scope: &SyncScope, limit: usize, offset: usize) -> Result<Vec<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE resource = ? AND scope = ?
             ORDER BY id LIMIT ? OFFSET ?"
        );
        self.query_records(
            &sql,
            params![scope.resource, scope.parent, limit as i64, offset as i64],
        )
    }

    #[allow(clippy::cast_sign_loss)]
    fn count(&self, scope: &SyncScope) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE resource = ? AND scope = ?",
            params![scope.resource, scope.parent],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn find_by_lookup_key(&self, resource: &str, key: &str) -> Result<Vec<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE resource = ? AND lookup_key = ? ORDER BY id"
        );
        self.query_records(&sql, params![resource, key])
    }

    fn set_delete_after(&self, id: i64, delete_after: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE records SET delete_after = ? WHERE id = ?",
            params![delete_after, id],
        )?;
        Ok(())
    }

    fn pending_retention(&self, scope: &SyncScope) -> Result<Vec<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE resource = ? AND scope = ? AND delete_after IS NULL
             ORDER BY id"
        );
        self.query_records(&sql, params![scope.resource, scope.parent])
    }

    fn overdue(&self, scope: &SyncScope, now: i64, limit: usize) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM records
             WHERE resource = ? AND scope = ? AND delete_after IS NOT NULL AND delete_after < ?
             ORDER BY id LIMIT ?",
        )?;
        let ids = stmt
            .query_map(
                params![scope.resource, scope.parent, now, limit as i64],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn delete_by_parent_key(&self, parent: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM records WHERE scope = ?", params![parent])?;
        Ok(deleted)
    }
}
