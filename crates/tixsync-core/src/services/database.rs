//! Shared database service wrapper used across clients and page workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{CursorLedger, Database, RecordRepository, SqliteRecordRepository};
use crate::models::{CursorEntry, LocalRecord, SyncCursor, SyncScope};
use crate::Result;

/// Thread-safe handle to the local store.
///
/// Async callers lock with `.await`; blocking page workers use
/// `blocking_lock` on the shared handle.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    ///
    /// A file SQLite refuses to read is moved aside and replaced with a fresh
    /// store, since every row can be downloaded again.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Detected invalid local DB file at {}: {}",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Shared handle for code that needs the raw connection
    pub fn handle(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale database sidecar {}", path.display());
            }
        }

        Ok(())
    }

    /// Cursor for one scope
    pub async fn cursor(&self, scope: &SyncScope) -> Result<Option<SyncCursor>> {
        let db = self.db.lock().await;
        CursorLedger::new(db.connection()).get(scope)
    }

    /// Store the cursor for one scope
    pub async fn save_cursor(&self, scope: &SyncScope, cursor: &SyncCursor) -> Result<()> {
        let db = self.db.lock().await;
        CursorLedger::new(db.connection()).upsert(scope, cursor)
    }

    /// Drop the cursor for one scope, forcing a fresh fetch next run
    pub async fn reset_cursor(&self, scope: &SyncScope) -> Result<bool> {
        let db = self.db.lock().await;
        CursorLedger::new(db.connection()).delete(scope)
    }

    /// Drop every cursor matching a resource prefix, optionally under one parent
    pub async fn clear_cursors(&self, parent: Option<&str>, resource_prefix: &str) -> Result<usize> {
        let db = self.db.lock().await;
        CursorLedger::new(db.connection()).clear(parent, resource_prefix)
    }

    /// All ledger rows
    pub async fn list_cursors(&self) -> Result<Vec<CursorEntry>> {
        let db = self.db.lock().await;
        CursorLedger::new(db.connection()).list()
    }

    /// Number of records in a scope
    pub async fn count_records(&self, scope: &SyncScope) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).count(scope)
    }

    /// List records of a scope
    pub async fn list_records(
        &self,
        scope: &SyncScope,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).list(scope, limit, offset)
    }

    /// Offline lookup by ticket secret or media identifier
    pub async fn find_by_lookup_key(&self, resource: &str, key: &str) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).find_by_lookup_key(resource, key)
    }

    /// Child records of one record
    pub async fn children(&self, parent_id: i64, resource: &str) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        SqliteRecordRepository::new(db.connection()).children(parent_id, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_cursor_roundtrip() {
        let service = DatabaseService::open_in_memory().unwrap();
        let scope = SyncScope::organizer("events");

        service
            .save_cursor(&scope, &SyncCursor::complete(Some("ts".to_string()), None))
            .await
            .unwrap();
        assert!(service.cursor(&scope).await.unwrap().unwrap().is_complete());
        assert_eq!(service.list_cursors().await.unwrap().len(), 1);

        assert!(service.reset_cursor(&scope).await.unwrap());
        assert!(service.cursor(&scope).await.unwrap().is_none());
    }

    #[test]
    fn detects_corrupted_db_errors() {
        assert!(DatabaseService::is_corrupted_db_error(
            &crate::Error::Database("file is not a database".to_string())
        ));
        assert!(!DatabaseService::is_corrupted_db_error(
            &crate::Error::InvalidInput("resource name is empty".to_string())
        ));
    }

    #[test]
    fn quarantine_moves_db_and_removes_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tixsync.db");
        let wal_path = dir.path().join("tixsync.db-wal");
        let shm_path = dir.path().join("tixsync.db-shm");

        std::fs::write(&db_path, b"bad-db").unwrap();
        std::fs::write(&wal_path, b"wal").unwrap();
        std::fs::write(&shm_path, b"shm").unwrap();

        DatabaseService::quarantine_corrupted_db_files(&db_path).unwrap();

        assert!(!db_path.exists());
        assert!(!wal_path.exists());
        assert!(!shm_path.exists());

        let found_backup = std::fs::read_dir(dir.path()).unwrap().any(|entry| {
            entry
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with("tixsync.db.corrupt-")
        });
        assert!(found_backup);
    }

    #[test]
    fn open_path_recovers_from_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tixsync.db");
        std::fs::write(&db_path, vec![0x42; 4096]).unwrap();

        let service = DatabaseService::open_path(&db_path).unwrap();
        assert_eq!(service.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }
}
