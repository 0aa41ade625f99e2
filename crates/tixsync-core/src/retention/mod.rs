//! Retention and cleanup
//!
//! Orders get a deletion horizon of the latest end of the sub-events their
//! positions touch, plus the retention period. Orders touching no sub-event,
//! or one whose date cannot be resolved, are never deleted. Events that are
//! no longer configured are purged with all their records once their own
//! horizon has passed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RetentionConfig;
use crate::db::{CursorLedger, RecordRepository, SqliteRecordRepository};
use crate::error::{Error, Result};
use crate::models::RemoteId;
use crate::remote::{Fetched, RemoteApi};
use crate::resources::{EventAdapter, OrderAdapter, SubEventAdapter, POSITIONS};
use crate::sync::{ResourceAdapter, SyncEngine};

/// Horizon for records that must never be deleted (9999-12-31T23:59:59Z).
pub const NEVER_DELETE: i64 = 253_402_300_799_000;

/// What one cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Orders whose horizon was (re)computed
    pub scheduled: usize,
    pub deleted_orders: usize,
    /// Sub-events that could not be resolved locally or remotely
    pub unresolved_subevents: usize,
    pub purged_events: Vec<String>,
}

impl RetentionReport {
    fn merge(&mut self, other: Self) {
        self.scheduled += other.scheduled;
        self.deleted_orders += other.deleted_orders;
        self.unresolved_subevents += other.unresolved_subevents;
        self.purged_events.extend(other.purged_events);
    }
}

/// Horizon for an order given the end dates of its sub-events.
///
/// `None` entries are unresolved sub-events.
pub fn order_horizon(ends: &[Option<i64>], retention_ms: i64) -> i64 {
    if ends.is_empty() {
        return NEVER_DELETE;
    }
    ends.iter()
        .try_fold(i64::MIN, |latest, end| end.map(|end| latest.max(end)))
        .map_or(NEVER_DELETE, |latest| {
            latest.saturating_add(retention_ms).min(NEVER_DELETE)
        })
}

/// Cleanup runner bound to an engine.
pub struct Retention<'a, C> {
    engine: &'a SyncEngine<C>,
    config: RetentionConfig,
    batch_size: usize,
}

impl<'a, C: RemoteApi> Retention<'a, C> {
    pub fn new(engine: &'a SyncEngine<C>, config: RetentionConfig) -> Self {
        Self {
            engine,
            config,
            batch_size: engine.batch_size(),
        }
    }

    /// Clean orders of every event in `events`, then purge events not in it.
    pub async fn run(&self, events: &[String], now: DateTime<Utc>) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();
        if !self.config.enabled {
            tracing::debug!("Retention disabled");
            return Ok(report);
        }

        for event in events {
            report.merge(self.clean_orders(event, now).await?);
        }
        report.purged_events = self.purge_events(events, now).await?;

        tracing::info!(
            "Retention: {} orders scheduled, {} deleted, {} events purged",
            report.scheduled,
            report.deleted_orders,
            report.purged_events.len()
        );
        Ok(report)
    }

    /// Compute pending order horizons for one event and delete overdue orders.
    pub async fn clean_orders(&self, event: &str, now: DateTime<Utc>) -> Result<RetentionReport> {
        let scope = OrderAdapter::new().scope(event);
        let mut report = RetentionReport::default();

        // Sub-event lookups may need the network, so collect first
        let pending_scope = scope.clone();
        let pending: Vec<(i64, BTreeSet<i64>)> = self
            .engine
            .with_store(move |db| {
                let repo = SqliteRecordRepository::new(db.connection());
                let mut pending = Vec::new();
                for order in repo.pending_retention(&pending_scope)? {
                    let subevents = repo
                        .children(order.id, POSITIONS)?
                        .into_iter()
                        .filter_map(|position| position.fields.subevent_id)
                        .collect();
                    pending.push((order.id, subevents));
                }
                Ok(pending)
            })
            .await?;

        let mut ends: HashMap<i64, Option<i64>> = HashMap::new();
        for subevent in pending.iter().flat_map(|(_, subevents)| subevents) {
            if !ends.contains_key(subevent) {
                let end = self.subevent_end(event, *subevent).await?;
                if end.is_none() {
                    report.unresolved_subevents += 1;
                }
                ends.insert(*subevent, end);
            }
        }

        let retention_ms = self.config.horizon().num_milliseconds();
        let now_ms = now.timestamp_millis();
        let batch_size = self.batch_size;
        report.scheduled = pending.len();

        let delete_scope = scope.clone();
        report.deleted_orders = self
            .engine
            .with_store(move |db| {
                let tx = db.connection_mut().transaction()?;
                {
                    let repo = SqliteRecordRepository::new(&tx);
                    for (order_id, subevents) in &pending {
                        let order_ends: Vec<Option<i64>> = subevents
                            .iter()
                            .map(|subevent| ends.get(subevent).copied().flatten())
                            .collect();
                        repo.set_delete_after(*order_id, order_horizon(&order_ends, retention_ms))?;
                    }
                }
                tx.commit()?;

                let mut deleted_orders = 0;
                loop {
                    let tx = db.connection_mut().transaction()?;
                    let deleted = {
                        let repo = SqliteRecordRepository::new(&tx);
                        let overdue = repo.overdue(&delete_scope, now_ms, batch_size)?;
                        repo.delete_many(&overdue)?
                    };
                    tx.commit()?;
                    if deleted == 0 {
                        return Ok(deleted_orders);
                    }
                    deleted_orders += deleted;
                }
            })
            .await?;

        if report.deleted_orders > 0 {
            tracing::info!("{}: deleted {} expired orders", scope, report.deleted_orders);
        }
        Ok(report)
    }

    /// End of a sub-event in Unix milliseconds, fetching it when unknown locally.
    async fn subevent_end(&self, event: &str, subevent: i64) -> Result<Option<i64>> {
        let adapter: Arc<dyn ResourceAdapter> = Arc::new(SubEventAdapter);
        let scope = adapter.scope(event);

        let local_scope = scope.clone();
        let local = self
            .engine
            .with_store(move |db| {
                SqliteRecordRepository::new(db.connection())
                    .find(&local_scope, &RemoteId::from_number(subevent))
            })
            .await?;
        if let Some(record) = local {
            return Ok(record.fields.ends_at);
        }

        let url = format!("{}{subevent}/", adapter.endpoint(event));
        match self.engine.remote().fetch(&url, None).await {
            Ok(response) => match response.body {
                Fetched::Data(object) => {
                    self.engine
                        .standalone_refresh(&adapter, event, &object)
                        .await?;
                    Ok(adapter.fields(&scope, &object)?.ends_at)
                }
                Fetched::NotModified => Ok(None),
            },
            Err(Error::NotFound(_)) => {
                tracing::warn!(
                    "Sub-event {} of {} not found; its orders are kept",
                    subevent,
                    event
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Remove events absent from `keep` whose horizon has passed, with all
    /// their records and cursors. Returns the purged slugs.
    pub async fn purge_events(&self, keep: &[String], now: DateTime<Utc>) -> Result<Vec<String>> {
        let retention_ms = self.config.horizon().num_milliseconds();
        let now_ms = now.timestamp_millis();
        let events_scope = EventAdapter.scope("");

        let keep = keep.to_vec();

        self.engine
            .with_store(move |db| {
                let candidates = {
                    let repo = SqliteRecordRepository::new(db.connection());
                    let total = repo.count(&events_scope)?;
                    repo.list(&events_scope, total, 0)?
                };

                let mut purged = Vec::new();
                for event in candidates {
                    let slug = event.remote_id.as_str();
                    if keep.iter().any(|kept| kept == slug) {
                        continue;
                    }
                    // Events without dates are kept
                    let Some(ends_at) = event.fields.ends_at else {
                        continue;
                    };
                    if ends_at.saturating_add(retention_ms) >= now_ms {
                        continue;
                    }

                    let tx = db.connection_mut().transaction()?;
                    let (records, cursors) = {
                        let repo = SqliteRecordRepository::new(&tx);
                        let records = repo.delete_by_parent_key(slug)?;
                        repo.delete(event.id)?;
                        (records, CursorLedger::new(&tx).clear(Some(slug), "")?)
                    };
                    tx.commit()?;

                    tracing::info!(
                        "Purged event {} ({} records, {} cursors)",
                        slug,
                        records,
                        cursors
                    );
                    purged.push(slug.to_string());
                }
                Ok(purged)
            })
            .await
    }
}
