//! Incremental synchronization engine
//!
//! A [`ResourceAdapter`] describes one resource kind. The [`SyncEngine`]
//! drives the page pipeline for it with one of three cursor strategies:
//!
//! - `Full`: unconditional fetch, unseen records deleted.
//! - `Conditional`: `If-Modified-Since` against the stored timestamp; a
//!   `304` is a no-op.
//! - `Resumable`: creation-ordered first fetch that checkpoints on
//!   interruption, then `modified_since` diffs anchored on the first page's
//!   generation time.

mod adapter;
mod engine;
mod manager;
mod pipeline;
mod worker;


pub use adapter::{id_field, ResourceAdapter, Strategy};
pub use engine::{DownloadOptions, FetchMode, RunSummary, SyncEngine};
pub use manager::{SyncManager, SyncReport};
pub use pipeline::{PageStats, UpsertOutcome};
pub use worker::{CancelFlag, PageTask, PageWorker};
