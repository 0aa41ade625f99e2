use std::path::Path;

use serde::Serialize;
use tixsync_core::models::ALL_PARENTS;
use tixsync_core::retention::RetentionReport;
use tixsync_core::RunSummary;

use crate::commands::common::{
    build_manager, cancel_on_ctrl_c, format_retention_lines, format_summary_lines,
    load_sync_config, map_cancelled,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SyncOutput {
    runs: Vec<RunSummary>,
    retention: Option<RetentionReport>,
}

pub async fn run_sync(
    events: Vec<String>,
    resource: Option<&str>,
    no_cleanup: bool,
    as_json: bool,
    profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let mut config = load_sync_config(profile)?;
    if !events.is_empty() {
        config.events = events;
    }
    if no_cleanup {
        config.retention.enabled = false;
    }

    let manager = build_manager(config, db_path)?;
    cancel_on_ctrl_c(&manager);

    let output = if let Some(resource) = resource {
        let organizer_level = manager
            .catalog()
            .organizer
            .iter()
            .any(|adapter| adapter.resource() == resource);
        let parents = if organizer_level {
            vec![ALL_PARENTS.to_string()]
        } else if manager.config().events.is_empty() {
            return Err(CliError::NoEvents);
        } else {
            manager.config().events.clone()
        };

        let mut runs = Vec::with_capacity(parents.len());
        for parent in &parents {
            runs.push(
                manager
                    .sync_resource(resource, parent)
                    .await
                    .map_err(map_cancelled)?,
            );
        }
        SyncOutput {
            runs,
            retention: None,
        }
    } else {
        let report = manager.sync_all().await.map_err(map_cancelled)?;
        SyncOutput {
            runs: report.runs,
            retention: report.retention,
        }
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in format_summary_lines(&output.runs) {
        println!("{line}");
    }
    if let Some(report) = &output.retention {
        for line in format_retention_lines(report) {
            println!("{line}");
        }
    }
    println!("Sync completed");
    Ok(())
}

pub async fn run_cleanup(
    keep: Vec<String>,
    as_json: bool,
    profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = load_sync_config(profile)?;
    let keep = if keep.is_empty() {
        config.events.clone()
    } else {
        keep
    };
    let manager = build_manager(config, db_path)?;

    let report = manager.cleanup(&keep).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for line in format_retention_lines(&report) {
        println!("{line}");
    }
    Ok(())
}
