//! Cursor strategies layered on the page pipeline

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::adapter::{ResourceAdapter, Strategy};
use super::pipeline::{refresh_object, Pipeline, RunOutcome, RunRequest, UpsertOutcome};
use super::worker::{CancelFlag, PageWorker};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{SyncCursor, SyncScope};
use crate::remote::RemoteApi;
use crate::services::DatabaseService;
use crate::util::with_query;

/// Caller-supplied knobs for one download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Fingerprint of the fetch dimensions; a change discards the cursor
    pub meta: Option<String>,
    /// Query parameters appended after the adapter's own
    pub query: Vec<(String, String)>,
    /// Partial fetch: never delete unseen records
    pub targeted: bool,
}

impl DownloadOptions {
    #[must_use]
    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn targeted(mut self) -> Self {
        self.targeted = true;
        self
    }
}

/// How a run fetched its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Full,
    Conditional,
    NotModified,
    Fresh,
    Resumed,
    Diff,
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::Conditional => "conditional",
            Self::NotModified => "not-modified",
            Self::Fresh => "fresh",
            Self::Resumed => "resumed",
            Self::Diff => "diff",
        };
        f.write_str(name)
    }
}

/// Report for one successful download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub scope: SyncScope,
    pub mode: FetchMode,
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    pub deleted: usize,
    pub total_count: Option<usize>,
}

impl RunSummary {
    fn new(scope: SyncScope, mode: FetchMode, outcome: &RunOutcome) -> Self {
        Self {
            scope,
            mode,
            processed: outcome.stats.processed(),
            inserted: outcome.stats.inserted,
            updated: outcome.stats.updated,
            unchanged: outcome.stats.unchanged,
            duplicates: outcome.stats.duplicates,
            deleted: outcome.deleted,
            total_count: outcome.total_count,
        }
    }
}

/// Resumable fetch window derived from the stored cursor.
enum ResumePlan {
    Fresh,
    Resumed {
        created_since: String,
        last_modified: Option<String>,
    },
    Diff {
        since: String,
    },
}

impl ResumePlan {
    fn from_cursor(cursor: Option<&SyncCursor>) -> Self {
        let Some(cursor) = cursor else {
            return Self::Fresh;
        };
        if let Some(created_since) = cursor.resume_point() {
            return Self::Resumed {
                created_since: created_since.to_string(),
                last_modified: cursor.last_modified.clone(),
            };
        }
        match (&cursor.last_modified, cursor.is_complete()) {
            (Some(since), true) => Self::Diff {
                since: since.clone(),
            },
            _ => Self::Fresh,
        }
    }

    const fn mode(&self) -> FetchMode {
        match self {
            Self::Fresh => FetchMode::Fresh,
            Self::Resumed { .. } => FetchMode::Resumed,
            Self::Diff { .. } => FetchMode::Diff,
        }
    }
}

/// Generic replication engine, owning its page worker and cancel flag.
pub struct SyncEngine<C> {
    remote: C,
    db: DatabaseService,
    worker: PageWorker,
    cancel: CancelFlag,
    batch_size: usize,
}

impl<C: RemoteApi> SyncEngine<C> {
    pub fn new(remote: C, db: DatabaseService, config: EngineConfig) -> Self {
        Self {
            remote,
            db,
            worker: PageWorker::new(config.page_workers),
            cancel: CancelFlag::default(),
            batch_size: config.identity_batch_size.max(1),
        }
    }

    /// Share an externally owned cancellation flag
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub const fn remote(&self) -> &C {
        &self.remote
    }

    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    pub(crate) const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Abort running downloads before their next page fetch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    /// Stop accepting page jobs; later downloads fail
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    fn pipeline(&self) -> Pipeline<'_, C> {
        Pipeline {
            remote: &self.remote,
            db: self.db.handle(),
            worker: &self.worker,
            cancel: &self.cancel,
            batch_size: self.batch_size,
        }
    }

    /// Replicate one scope of `adapter` under `parent`.
    pub async fn download(
        &self,
        adapter: &Arc<dyn ResourceAdapter>,
        parent: &str,
        options: &DownloadOptions,
    ) -> Result<RunSummary> {
        let scope = adapter.scope(parent);
        let endpoint = adapter.endpoint(parent);
        let mut query = adapter.query();
        query.extend(options.query.iter().cloned());

        let summary = match adapter.strategy() {
            Strategy::Full => {
                self.download_full(adapter, scope, &endpoint, &query, options)
                    .await?
            }
            Strategy::Conditional => {
                self.download_conditional(adapter, scope, &endpoint, &query, options)
                    .await?
            }
            Strategy::Resumable => {
                self.download_resumable(adapter, scope, &endpoint, query, options)
                    .await?
            }
        };

        tracing::info!(
            "Synced {} ({}): {} processed, {} inserted, {} updated, {} deleted",
            summary.scope,
            summary.mode,
            summary.processed,
            summary.inserted,
            summary.updated,
            summary.deleted
        );
        Ok(summary)
    }

    async fn download_full(
        &self,
        adapter: &Arc<dyn ResourceAdapter>,
        scope: SyncScope,
        endpoint: &str,
        query: &[(String, String)],
        options: &DownloadOptions,
    ) -> Result<RunSummary> {
        let mut outcome = self
            .pipeline()
            .run(RunRequest {
                scope: scope.clone(),
                adapter: Arc::clone(adapter),
                url: with_query(endpoint, query),
                if_modified_since: None,
                delete_unseen: !options.targeted,
            })
            .await;

        if let Some(error) = outcome.error.take() {
            return Err(error);
        }
        Ok(RunSummary::new(scope, FetchMode::Full, &outcome))
    }

    /// Load the cursor, ignoring it when the caller's meta differs.
    ///
    /// The stored row is left alone; a successful run overwrites it.
    async fn load_cursor(
        &self,
        scope: &SyncScope,
        options: &DownloadOptions,
    ) -> Result<Option<SyncCursor>> {
        let cursor = self.db.cursor(scope).await?;
        match cursor {
            Some(cursor) if cursor.meta != options.meta => {
                tracing::warn!(
                    "Ignoring cursor for {}: meta changed from {:?} to {:?}",
                    scope,
                    cursor.meta,
                    options.meta
                );
                Ok(None)
            }
            cursor => Ok(cursor),
        }
    }

    async fn download_conditional(
        &self,
        adapter: &Arc<dyn ResourceAdapter>,
        scope: SyncScope,
        endpoint: &str,
        query: &[(String, String)],
        options: &DownloadOptions,
    ) -> Result<RunSummary> {
        let cursor = self.load_cursor(&scope, options).await?;
        let if_modified_since = cursor.and_then(|cursor| cursor.last_modified);

        let mut outcome = self
            .pipeline()
            .run(RunRequest {
                scope: scope.clone(),
                adapter: Arc::clone(adapter),
                url: with_query(endpoint, query),
                if_modified_since,
                delete_unseen: !options.targeted,
            })
            .await;

        if let Some(error) = outcome.error.take() {
            return Err(error);
        }
        if outcome.not_modified {
            tracing::debug!("{}: not modified", scope);
            return Ok(RunSummary::new(scope, FetchMode::NotModified, &outcome));
        }

        let last_modified = outcome
            .last_modified
            .clone()
            .or_else(|| outcome.first_page_generated.clone());
        self.db
            .save_cursor(
                &scope,
                &SyncCursor::complete(last_modified, options.meta.clone()),
            )
            .await?;
        Ok(RunSummary::new(scope, FetchMode::Conditional, &outcome))
    }

    async fn download_resumable(
        &self,
        adapter: &Arc<dyn ResourceAdapter>,
        scope: SyncScope,
        endpoint: &str,
        mut query: Vec<(String, String)>,
        options: &DownloadOptions,
    ) -> Result<RunSummary> {
        let cursor = self.load_cursor(&scope, options).await?;
        let plan = ResumePlan::from_cursor(cursor.as_ref());
        // A diff or resumed run sees only part of the collection
        let delete_unseen = matches!(plan, ResumePlan::Fresh) && !options.targeted;

        match &plan {
            ResumePlan::Fresh => {
                query.push(("ordering".to_string(), adapter.creation_ordering().to_string()));
            }
            ResumePlan::Resumed { created_since, .. } => {
                query.push(("ordering".to_string(), adapter.creation_ordering().to_string()));
                query.push(("created_since".to_string(), created_since.clone()));
            }
            ResumePlan::Diff { since } => {
                query.push((
                    "ordering".to_string(),
                    adapter.modification_ordering().to_string(),
                ));
                query.push(("modified_since".to_string(), since.clone()));
            }
        }
        tracing::debug!("{}: {} fetch", scope, plan.mode());

        let mut outcome = self
            .pipeline()
            .run(RunRequest {
                scope: scope.clone(),
                adapter: Arc::clone(adapter),
                url: with_query(endpoint, &query),
                if_modified_since: None,
                delete_unseen,
            })
            .await;

        let Some(error) = outcome.error.take() else {
            let last_modified = match &plan {
                ResumePlan::Fresh => outcome.first_page_generated.clone(),
                ResumePlan::Resumed { last_modified, .. } => last_modified.clone(),
                ResumePlan::Diff { since } => outcome
                    .first_page_generated
                    .clone()
                    .or_else(|| Some(since.clone())),
            };
            self.db
                .save_cursor(
                    &scope,
                    &SyncCursor::complete(last_modified, options.meta.clone()),
                )
                .await?;
            return Ok(RunSummary::new(scope, plan.mode(), &outcome));
        };

        if error.is_fatal() {
            return Err(error);
        }

        let checkpoint_base = match &plan {
            ResumePlan::Fresh => Some(outcome.first_page_generated.clone()),
            ResumePlan::Resumed { last_modified, .. } => Some(last_modified.clone()),
            // The stored window stays valid; the next diff repeats it
            ResumePlan::Diff { .. } => None,
        };
        if let (Some(last_modified), Some(created_since)) =
            (checkpoint_base, outcome.last_created.clone())
        {
            tracing::info!(
                "{}: interrupted after {} objects, resuming from {} next run",
                scope,
                outcome.stats.processed(),
                created_since
            );
            // Checkpoint failure must not mask the run error
            if let Err(ledger_error) = self
                .db
                .save_cursor(
                    &scope,
                    &SyncCursor::incomplete(last_modified, options.meta.clone(), created_since),
                )
                .await
            {
                tracing::warn!("{}: could not store checkpoint: {}", scope, ledger_error);
            }
        }

        Err(error)
    }

    /// Write one object fetched out of band. No cursor is touched and
    /// nothing is deleted.
    pub async fn standalone_refresh(
        &self,
        adapter: &Arc<dyn ResourceAdapter>,
        parent: &str,
        object: &Value,
    ) -> Result<UpsertOutcome> {
        let adapter = Arc::clone(adapter);
        let scope = adapter.scope(parent);
        let object = object.clone();

        self.with_store(move |db| refresh_object(db, adapter.as_ref(), &scope, &object))
            .await
    }

    /// Run blocking store work on the page worker.
    pub(crate) async fn with_store<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.handle();
        let task = self
            .worker
            .submit(move || {
                let mut db = db.blocking_lock();
                job(&mut db)
            })
            .await?;
        task.join().await?
    }
}
