//! Page pipeline: paginated fetch overlapped with transactional page writes

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::adapter::ResourceAdapter;
use super::worker::{CancelFlag, PageTask, PageWorker};
use crate::db::{resolve_in_batches, Database, RecordRepository, SqliteRecordRepository};
use crate::error::{Error, Result};
use crate::models::{LocalRecord, RecordDraft, RemoteId, SyncScope};
use crate::remote::{Fetched, Page, RemoteApi};

/// Result of writing one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Write counters, summed over committed pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Objects skipped because their identity was already seen this run
    pub duplicates: usize,
}

impl PageStats {
    pub const fn processed(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.duplicates += other.duplicates;
    }
}

/// Per-run bookkeeping, moved into each page job and handed back.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// Identities processed so far this run
    pub seen: HashSet<RemoteId>,
    /// Local identities not matched yet
    pub known: HashSet<RemoteId>,
    /// Creation timestamp of the last committed object
    pub last_created: Option<String>,
    pub stats: PageStats,
}

impl RunState {
    fn new(known: HashSet<RemoteId>) -> Self {
        Self {
            known,
            ..Self::default()
        }
    }
}

/// What one pipeline run did.
#[derive(Debug, Default)]
pub(crate) struct RunOutcome {
    pub stats: PageStats,
    pub pages: usize,
    pub total_count: Option<usize>,
    /// `X-Page-Generated` of the first page
    pub first_page_generated: Option<String>,
    /// `Last-Modified` of the first page
    pub last_modified: Option<String>,
    pub last_created: Option<String>,
    pub not_modified: bool,
    pub deleted: usize,
    pub error: Option<Error>,
}

/// One pipeline invocation.
pub(crate) struct RunRequest {
    pub scope: SyncScope,
    pub adapter: Arc<dyn ResourceAdapter>,
    pub url: String,
    pub if_modified_since: Option<String>,
    pub delete_unseen: bool,
}

type PendingPage = PageTask<(RunState, Result<()>)>;

/// Borrowed engine parts a run needs.
pub(crate) struct Pipeline<'a, C> {
    pub remote: &'a C,
    pub db: Arc<Mutex<Database>>,
    pub worker: &'a PageWorker,
    pub cancel: &'a CancelFlag,
    pub batch_size: usize,
}

impl<C: RemoteApi> Pipeline<'_, C> {
    /// Fetch every page of `request.url`, writing each page in its own
    /// transaction while the next page is fetched.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        let mut outcome = RunOutcome::default();

        let known = {
            let db = self.db.lock().await;
            SqliteRecordRepository::new(db.connection()).known_identities(&request.scope)
        };
        let mut state = match known {
            Ok(known) => Some(RunState::new(known)),
            Err(error) => {
                outcome.error = Some(error);
                return outcome;
            }
        };

        let mut pending: Option<PendingPage> = None;
        let mut next_url = Some(request.url.clone());
        let mut first = true;

        while let Some(url) = next_url.take() {
            if let Err(error) = self.cancel.check() {
                outcome.error = Some(error);
                break;
            }

            let precondition = if first {
                request.if_modified_since.as_deref()
            } else {
                None
            };
            let response = match self.remote.fetch(&url, precondition).await {
                Ok(response) => response,
                Err(error) => {
                    outcome.error = Some(error);
                    break;
                }
            };

            let page = match response.body {
                Fetched::NotModified if first => {
                    outcome.not_modified = true;
                    break;
                }
                Fetched::NotModified => Err(Error::InvalidResponse(format!(
                    "{url} answered not modified without a precondition"
                ))),
                Fetched::Data(value) => Page::from_value(value),
            };
            let page = match page {
                Ok(page) => page,
                Err(error) => {
                    outcome.error = Some(error);
                    break;
                }
            };

            if first {
                outcome.first_page_generated = response.page_generated;
                outcome.last_modified = response.last_modified;
                outcome.total_count = Some(page.count);
                first = false;
            }
            outcome.pages += 1;
            tracing::debug!(
                "{}: page {} with {} objects (next: {})",
                request.scope,
                outcome.pages,
                page.results.len(),
                page.next.is_some()
            );

            // Depth one: the previous page must be committed before the next is queued
            if let Err(error) = settle(&mut pending, &mut state, &mut outcome).await {
                outcome.error = Some(error);
                break;
            }
            let Some(run_state) = state.take() else {
                outcome.error = Some(Error::Worker("run state lost".to_string()));
                break;
            };

            next_url = page.next;
            match self.submit_page(&request, page.results, run_state).await {
                Ok(task) => pending = Some(task),
                Err(error) => {
                    outcome.error = Some(error);
                    break;
                }
            }
        }

        if let Err(error) = settle(&mut pending, &mut state, &mut outcome).await {
            if outcome.error.is_none() {
                outcome.error = Some(error);
            }
        }

        if outcome.error.is_none() && !outcome.not_modified && request.delete_unseen {
            if let Some(state) = state.take() {
                match self.delete_unseen(&request, state.known).await {
                    Ok(deleted) => outcome.deleted = deleted,
                    Err(error) => outcome.error = Some(error),
                }
            }
        }

        outcome
    }

    async fn submit_page(
        &self,
        request: &RunRequest,
        results: Vec<Value>,
        mut state: RunState,
    ) -> Result<PendingPage> {
        let db = Arc::clone(&self.db);
        let adapter = Arc::clone(&request.adapter);
        let scope = request.scope.clone();
        let batch_size = self.batch_size;

        self.worker
            .submit(move || {
                let mut db = db.blocking_lock();
                let result = apply_page(
                    &mut db,
                    adapter.as_ref(),
                    &scope,
                    batch_size,
                    &results,
                    &mut state,
                );
                (state, result)
            })
            .await
    }

    async fn delete_unseen(
        &self,
        request: &RunRequest,
        unseen: HashSet<RemoteId>,
    ) -> Result<usize> {
        if unseen.is_empty() {
            return Ok(0);
        }

        let db = Arc::clone(&self.db);
        let adapter = Arc::clone(&request.adapter);
        let scope = request.scope.clone();
        let batch_size = self.batch_size;
        let mut ids: Vec<RemoteId> = unseen.into_iter().collect();
        ids.sort();

        let task = self
            .worker
            .submit(move || -> Result<usize> {
                let mut db = db.blocking_lock();
                let tx = db.connection_mut().transaction()?;
                let mut deleted = 0;
                {
                    let repo = SqliteRecordRepository::new(&tx);
                    let records = resolve_in_batches(&repo, &scope, &ids, batch_size)?;
                    for record in records.values() {
                        adapter.before_delete(&repo, record)?;
                        repo.delete(record.id)?;
                        deleted += 1;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await?;

        let deleted = task.join().await??;
        tracing::debug!("{}: deleted {} unseen records", request.scope, deleted);
        Ok(deleted)
    }
}

/// Join the in-flight page, if any, and fold its result into the outcome.
async fn settle(
    pending: &mut Option<PendingPage>,
    state: &mut Option<RunState>,
    outcome: &mut RunOutcome,
) -> Result<()> {
    let Some(task) = pending.take() else {
        return Ok(());
    };
    let (run_state, result) = task.join().await?;
    outcome.stats = run_state.stats;
    outcome.last_created.clone_from(&run_state.last_created);
    *state = Some(run_state);
    result
}

/// Write one page inside a single transaction.
///
/// Any mapping or store error rolls back the whole page. `state` only
/// changes after the commit.
pub(crate) fn apply_page(
    db: &mut Database,
    adapter: &dyn ResourceAdapter,
    scope: &SyncScope,
    batch_size: usize,
    results: &[Value],
    state: &mut RunState,
) -> Result<()> {
    let ids = results
        .iter()
        .map(|object| adapter.remote_id(object))
        .collect::<Result<Vec<_>>>()?;

    let mut lookup: Vec<RemoteId> = Vec::with_capacity(ids.len());
    let mut unique = HashSet::with_capacity(ids.len());
    for id in &ids {
        if !state.seen.contains(id) && unique.insert(id) {
            lookup.push(id.clone());
        }
    }

    let tx = db.connection_mut().transaction()?;
    let mut page_seen: HashSet<RemoteId> = HashSet::with_capacity(ids.len());
    let mut stats = PageStats::default();
    let mut last_created = None;
    {
        let repo = SqliteRecordRepository::new(&tx);
        let existing = resolve_in_batches(&repo, scope, &lookup, batch_size)?;

        for (id, object) in ids.into_iter().zip(results) {
            if let Some(created) = adapter.created_at(object) {
                last_created = Some(created);
            }
            if state.seen.contains(&id) || page_seen.contains(&id) {
                stats.duplicates += 1;
                continue;
            }
            let outcome = upsert_object(&repo, adapter, scope, &id, object, existing.get(&id))?;
            stats.record(outcome);
            page_seen.insert(id);
        }
    }
    tx.commit()?;

    for id in &page_seen {
        state.known.remove(id);
    }
    state.seen.extend(page_seen);
    state.stats.merge(stats);
    if last_created.is_some() {
        state.last_created = last_created;
    }
    Ok(())
}

/// Insert or update one object and its relations.
///
/// Payloads structurally equal to the stored one are left untouched.
pub(crate) fn upsert_object(
    repo: &dyn RecordRepository,
    adapter: &dyn ResourceAdapter,
    scope: &SyncScope,
    remote_id: &RemoteId,
    object: &Value,
    existing: Option<&LocalRecord>,
) -> Result<UpsertOutcome> {
    if existing.is_some_and(|record| record.matches(object)) {
        return Ok(UpsertOutcome::Unchanged);
    }

    let draft = RecordDraft {
        remote_id: remote_id.clone(),
        parent_id: None,
        json_data: object.clone(),
        fields: adapter.fields(scope, object)?,
    };

    if let Some(record) = existing {
        repo.update(record.id, &draft)?;
        let updated = LocalRecord {
            json_data: draft.json_data,
            fields: draft.fields,
            delete_after: None,
            ..record.clone()
        };
        adapter.upsert_relations(repo, &updated, object)?;
        Ok(UpsertOutcome::Updated)
    } else {
        let record = repo.insert(scope, &draft)?;
        adapter.upsert_relations(repo, &record, object)?;
        Ok(UpsertOutcome::Inserted)
    }
}

/// Upsert a single object outside of any page run.
pub(crate) fn refresh_object(
    db: &mut Database,
    adapter: &dyn ResourceAdapter,
    scope: &SyncScope,
    object: &Value,
) -> Result<UpsertOutcome> {
    let remote_id = adapter.remote_id(object)?;
    let tx = db.connection_mut().transaction()?;
    let outcome = {
        let repo = SqliteRecordRepository::new(&tx);
        let existing = repo.find(scope, &remote_id)?;
        upsert_object(&repo, adapter, scope, &remote_id, object, existing.as_ref())?
    };
    tx.commit()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordFields;
    use crate::sync::adapter::Strategy;
    use serde_json::json;

    struct Tags;

    impl ResourceAdapter for Tags {
        fn resource(&self) -> &str {
            "tags"
        }

        fn endpoint(&self, _parent: &str) -> String {
            "tags/".to_string()
        }

        fn strategy(&self) -> Strategy {
            Strategy::Full
        }

        fn fields(&self, _scope: &SyncScope, object: &Value) -> Result<RecordFields> {
            Ok(RecordFields {
                lookup_key: object
                    .get("name")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                ..RecordFields::default()
            })
        }
    }

    fn scope() -> SyncScope {
        SyncScope::organizer("tags")
    }

    #[test]
    fn replaying_a_page_writes_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        let page = vec![json!({"id": 1, "name": "vip"}), json!({"id": 2, "name": "press"})];

        let mut first = RunState::default();
        apply_page(&mut db, &Tags, &scope(), 500, &page, &mut first).unwrap();
        assert_eq!(first.stats.inserted, 2);

        let before = SqliteRecordRepository::new(db.connection())
            .list(&scope(), 10, 0)
            .unwrap();

        let mut second = RunState::default();
        apply_page(&mut db, &Tags, &scope(), 500, &page, &mut second).unwrap();
        assert_eq!(second.stats.unchanged, 2);
        assert_eq!(second.stats.inserted + second.stats.updated, 0);

        let after = SqliteRecordRepository::new(db.connection())
            .list(&scope(), 10, 0)
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn duplicates_across_pages_are_skipped() {
        let mut db = Database::open_in_memory().unwrap();
        let mut state = RunState::default();

        apply_page(&mut db, &Tags, &scope(), 500, &[json!({"id": 1, "name": "a"})], &mut state)
            .unwrap();
        apply_page(
            &mut db,
            &Tags,
            &scope(),
            500,
            &[json!({"id": 1, "name": "b"}), json!({"id": 2, "name": "c"})],
            &mut state,
        )
        .unwrap();

        assert_eq!(state.stats.inserted, 2);
        assert_eq!(state.stats.duplicates, 1);
        let repo = SqliteRecordRepository::new(db.connection());
        assert_eq!(repo.count(&scope()).unwrap(), 2);
        let stored = repo.find(&scope(), &RemoteId::from_number(1)).unwrap().unwrap();
        assert_eq!(stored.json_data["name"], "a");
    }

    #[test]
    fn known_identities_shrink_as_matched() {
        let mut db = Database::open_in_memory().unwrap();
        let mut seed = RunState::default();
        apply_page(
            &mut db,
            &Tags,
            &scope(),
            500,
            &[json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
            &mut seed,
        )
        .unwrap();

        let known = SqliteRecordRepository::new(db.connection())
            .known_identities(&scope())
            .unwrap();
        let mut state = RunState::new(known);
        apply_page(&mut db, &Tags, &scope(), 500, &[json!({"id": 2, "name": "b2"})], &mut state)
            .unwrap();

        assert_eq!(state.stats.updated, 1);
        assert_eq!(
            state.known.into_iter().collect::<Vec<_>>(),
            vec![RemoteId::from_number(1)]
        );
    }

    #[test]
    fn mapping_error_rolls_back_whole_page() {
        let mut db = Database::open_in_memory().unwrap();
        let mut state = RunState::default();

        let error = apply_page(
            &mut db,
            &Tags,
            &scope(),
            500,
            &[json!({"id": 1, "name": "a"}), json!({"name": "no id"})],
            &mut state,
        )
        .unwrap_err();

        assert!(matches!(error, Error::Mapping(_)));
        assert_eq!(state.stats, PageStats::default());
        assert!(state.seen.is_empty());
        assert_eq!(
            SqliteRecordRepository::new(db.connection())
                .count(&scope())
                .unwrap(),
            0
        );
    }

    #[test]
    fn refresh_object_reports_outcome() {
        let mut db = Database::open_in_memory().unwrap();
        let object = json!({"id": 9, "name": "staff"});

        assert_eq!(
            refresh_object(&mut db, &Tags, &scope(), &object).unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            refresh_object(&mut db, &Tags, &scope(), &object).unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            refresh_object(&mut db, &Tags, &scope(), &json!({"id": 9, "name": "crew"})).unwrap(),
            UpsertOutcome::Updated
        );
    }
}
