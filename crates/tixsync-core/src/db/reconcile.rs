//! Batched identity lookup

use std::collections::HashMap;

use super::RecordRepository;
use crate::error::Result;
use crate::models::{LocalRecord, RemoteId, SyncScope};

/// Identities per lookup query; `SQLite` caps bound parameters per statement.
pub const MAX_QUERY_PARAMETERS: usize = 500;

/// Load the local records matching `ids`, one query per chunk of `batch_size`.
///
/// If the store holds several rows for one identity, the oldest row is kept
/// and the others are deleted.
pub fn resolve_in_batches<R: RecordRepository + ?Sized>(
    repo: &R,
    scope: &SyncScope,
    ids: &[RemoteId],
    batch_size: usize,
) -> Result<HashMap<RemoteId, LocalRecord>> {
    let mut resolved: HashMap<RemoteId, LocalRecord> = HashMap::with_capacity(ids.len());
    if ids.is_empty() {
        return Ok(resolved);
    }

    let mut duplicates = Vec::new();
    for chunk in ids.chunks(batch_size.max(1)) {
        for record in repo.find_by_identities(scope, chunk)? {
            match resolved.get(&record.remote_id) {
                Some(existing) if existing.id <= record.id => duplicates.push(record.id),
                Some(existing) => {
                    duplicates.push(existing.id);
                    resolved.insert(record.remote_id.clone(), record);
                }
                None => {
                    resolved.insert(record.remote_id.clone(), record);
                }
            }
        }
    }

    if !duplicates.is_empty() {
        tracing::warn!(
            "Removing {} duplicate rows from {}",
            duplicates.len(),
            scope
        );
        repo.delete_many(&duplicates)?;
    }

    Ok(resolved)
}
