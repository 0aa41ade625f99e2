//! Orchestration of a complete sync over all configured resources

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::adapter::ResourceAdapter;
use super::engine::{DownloadOptions, RunSummary, SyncEngine};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::ALL_PARENTS;
use crate::remote::RemoteApi;
use crate::resources::{catalog, Catalog};
use crate::retention::{Retention, RetentionReport};

const FUTURE_ORDERS_META: &str = "subevent_after";

/// Result of a complete sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub runs: Vec<RunSummary>,
    pub retention: Option<RetentionReport>,
}

impl SyncReport {
    pub fn processed(&self) -> usize {
        self.runs.iter().map(|run| run.processed).sum()
    }
}

/// Runs the engine over the organizer resources, then every configured
/// event, then retention.
pub struct SyncManager<C> {
    engine: SyncEngine<C>,
    config: SyncConfig,
    catalog: Catalog,
}

impl<C: RemoteApi> SyncManager<C> {
    pub fn new(engine: SyncEngine<C>, config: SyncConfig) -> Self {
        let catalog = catalog(&config);
        Self {
            engine,
            config,
            catalog,
        }
    }

    pub const fn engine(&self) -> &SyncEngine<C> {
        &self.engine
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Sync everything configured and apply retention.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        self.sync_all_at(Utc::now()).await
    }

    /// [`Self::sync_all`] with an explicit clock.
    pub async fn sync_all_at(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        self.engine.reset_cancel();
        let mut report = SyncReport::default();

        for adapter in &self.catalog.organizer {
            report.runs.push(self.run(adapter, ALL_PARENTS, now).await?);
        }
        report
            .runs
            .extend(self.sync_events_at(&self.config.events, now).await?);

        if self.config.retention.enabled {
            report.retention = Some(self.cleanup_at(&self.config.events, now).await?);
        }
        Ok(report)
    }

    /// Sync the per-event resources of `events` only.
    pub async fn sync_events(&self, events: &[String]) -> Result<Vec<RunSummary>> {
        self.engine.reset_cancel();
        self.sync_events_at(events, Utc::now()).await
    }

    async fn sync_events_at(&self, events: &[String], now: DateTime<Utc>) -> Result<Vec<RunSummary>> {
        let mut runs = Vec::new();
        for event in events {
            tracing::debug!("Syncing event {}", event);
            for adapter in &self.catalog.event {
                runs.push(self.run(adapter, event, now).await?);
            }
        }
        Ok(runs)
    }

    /// Sync a single resource, by name, under `parent`.
    pub async fn sync_resource(&self, resource: &str, parent: &str) -> Result<RunSummary> {
        let adapter = self
            .catalog
            .find(resource)
            .ok_or_else(|| Error::InvalidInput(format!("unknown resource: {resource}")))?;
        self.engine.reset_cancel();
        self.run(adapter, parent, Utc::now()).await
    }

    /// Apply retention with `keep` as the list of live events.
    pub async fn cleanup(&self, keep: &[String]) -> Result<RetentionReport> {
        self.cleanup_at(keep, Utc::now()).await
    }

    pub async fn cleanup_at(&self, keep: &[String], now: DateTime<Utc>) -> Result<RetentionReport> {
        Retention::new(&self.engine, self.config.retention)
            .run(keep, now)
            .await
    }

    async fn run(
        &self,
        adapter: &Arc<dyn ResourceAdapter>,
        parent: &str,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let options = self.options_for(adapter.as_ref(), now);
        self.engine.download(adapter, parent, &options).await
    }

    fn options_for(&self, adapter: &dyn ResourceAdapter, now: DateTime<Utc>) -> DownloadOptions {
        let options = DownloadOptions::default();
        if adapter.resource() == "orders" && self.config.future_orders_only {
            // The cutoff moves every run; the meta keeps the cursor stable
            return options.with_meta(FUTURE_ORDERS_META).with_query(
                FUTURE_ORDERS_META,
                now.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        options
    }
}
