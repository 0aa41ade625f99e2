//! tixsync-core - Core library for tixsync
//!
//! This crate contains the local SQLite store, the remote REST client and the
//! incremental sync engine used by offline check-in clients. A client keeps a
//! replica of an organizer's events, products and orders, refreshed through
//! resumable, checkpointed downloads.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod resources;
pub mod retention;
pub mod services;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{LocalRecord, RemoteId, SyncCursor, SyncScope};
pub use services::DatabaseService;
pub use sync::{DownloadOptions, RunSummary, SyncEngine, SyncManager, SyncReport};
