//! Data models for tixsync

mod cursor;
mod record;
mod scope;

pub use cursor::{CursorEntry, CursorStatus, SyncCursor};
pub use record::{LocalRecord, RecordDraft, RecordFields, RemoteId};
pub use scope::{SyncScope, ALL_PARENTS};
