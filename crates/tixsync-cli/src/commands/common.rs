use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tixsync_core::models::{CursorEntry, CursorStatus, LocalRecord};
use tixsync_core::remote::ApiClient;
use tixsync_core::retention::RetentionReport;
use tixsync_core::{DatabaseService, RunSummary, SyncConfig, SyncEngine, SyncManager};

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CursorItem {
    pub resource: String,
    pub parent: String,
    pub status: String,
    pub last_modified: Option<String>,
    pub meta: Option<String>,
    pub updated_at: i64,
    pub updated_at_iso: String,
}

pub fn cursor_to_item(entry: &CursorEntry) -> CursorItem {
    CursorItem {
        resource: entry.scope.resource.clone(),
        parent: entry.scope.parent.clone(),
        status: format_status(entry.cursor.status.as_ref()),
        last_modified: entry.cursor.last_modified.clone(),
        meta: entry.cursor.meta.clone(),
        updated_at: entry.updated_at,
        updated_at_iso: format_sync_timestamp(entry.updated_at),
    }
}

pub fn format_status(status: Option<&CursorStatus>) -> String {
    status.map_or_else(|| "unknown".to_string(), ToString::to_string)
}

pub fn format_cursor_lines(entries: &[CursorEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<28}  {:<34}  since={}",
                format_sync_timestamp(entry.updated_at),
                entry.scope.to_string(),
                format_status(entry.cursor.status.as_ref()),
                entry.cursor.last_modified.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

pub fn format_summary_lines(runs: &[RunSummary]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            format!(
                "{:<28}  {:<12}  processed={} inserted={} updated={} deleted={}",
                run.scope.to_string(),
                run.mode.to_string(),
                run.processed,
                run.inserted,
                run.updated,
                run.deleted
            )
        })
        .collect()
}

pub fn format_retention_lines(report: &RetentionReport) -> Vec<String> {
    let mut lines = vec![format!(
        "retention  scheduled={} deleted={} unresolved_subevents={}",
        report.scheduled, report.deleted_orders, report.unresolved_subevents
    )];
    lines.extend(
        report
            .purged_events
            .iter()
            .map(|event| format!("purged event {event}")),
    );
    lines
}

pub fn format_record_lines(records: &[LocalRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{}  {}@{}  id={}",
                format_sync_timestamp(record.synced_at),
                record.resource,
                record.scope,
                record.remote_id
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TIXSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tixsync")
        .join("tixsync.db")
}

pub fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(DatabaseService::open_path(path)?)
}

/// Environment first, then the selected profile.
pub fn load_sync_config(profile: Option<&str>) -> Result<SyncConfig, CliError> {
    let profiles = CliProfilesConfig::load()?;
    let name = profiles.resolve_profile_name(profile);
    let selected = profiles.profile(&name).cloned().unwrap_or_default();
    tracing::debug!("Using profile {}", name);
    sync_config_from(&selected, |key| env::var(key).ok())
}

pub fn sync_config_from(
    profile: &CliProfile,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<SyncConfig, CliError> {
    Ok(SyncConfig::from_lookup(|name| {
        env_lookup(name)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| profile.lookup(name))
    })?)
}

pub fn build_manager(
    config: SyncConfig,
    db_path: &Path,
) -> Result<SyncManager<ApiClient>, CliError> {
    let db = open_database(db_path)?;
    let client = ApiClient::new(&config.remote)?;
    let engine = SyncEngine::new(client, db, config.engine);
    Ok(SyncManager::new(engine, config))
}

/// Raise the engine's cancel flag on Ctrl-C.
pub fn cancel_on_ctrl_c(manager: &SyncManager<ApiClient>) {
    let flag = manager.engine().cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current page");
            flag.cancel();
        }
    });
}

pub fn map_cancelled(error: tixsync_core::Error) -> CliError {
    match error {
        tixsync_core::Error::Cancelled => CliError::Cancelled,
        other => CliError::Core(other),
    }
}
