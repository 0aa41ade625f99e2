//! Database layer for tixsync

mod connection;
mod ledger;
mod migrations;
mod reconcile;
mod repository;

pub use connection::Database;
pub use ledger::CursorLedger;
pub use reconcile::{resolve_in_batches, MAX_QUERY_PARAMETERS};
pub use repository::{RecordRepository, SqliteRecordRepository};
