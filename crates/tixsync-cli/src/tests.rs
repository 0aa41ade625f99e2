use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use tixsync_core::models::{CursorEntry, CursorStatus, SyncCursor, SyncScope};
use tixsync_core::retention::RetentionReport;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::commands::common::{
    cursor_to_item, format_cursor_lines, format_retention_lines, format_status,
    format_sync_timestamp, open_database, resolve_db_path, sync_config_from,
};
use crate::commands::config::merge_profile;
use crate::commands::lookup::run_lookup;
use crate::commands::reset::run_reset;
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

fn profile() -> CliProfile {
    CliProfile {
        api_url: Some("https://tix.example".to_string()),
        organizer: Some("demo".to_string()),
        events: vec!["democon".to_string()],
    }
}

#[test]
fn sync_command_parses_repeated_events() {
    let cli = Cli::try_parse_from([
        "tixsync", "sync", "--event", "democon", "--event", "expo", "--json",
    ])
    .unwrap();
    match cli.command {
        Commands::Sync {
            events,
            resource,
            no_cleanup,
            json,
        } => {
            assert_eq!(events, vec!["democon".to_string(), "expo".to_string()]);
            assert_eq!(resource, None);
            assert!(!no_cleanup);
            assert!(json);
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn reset_all_conflicts_with_filters() {
    assert!(Cli::try_parse_from(["tixsync", "reset", "--all", "--event", "democon"]).is_err());
    assert!(Cli::try_parse_from(["tixsync", "reset", "--all"]).is_ok());
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "tixsync",
        "config",
        "init",
        "--api-url",
        "https://tix.example",
        "--profile",
        "gate-2",
        "--db-path",
        "/tmp/replica.db",
    ])
    .unwrap();
    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/replica.db")));
    assert!(matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommands::Init { .. }
        }
    ));
}

#[test]
fn explicit_db_path_wins() {
    let path = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(path.clone())), path);
}

#[test]
fn environment_overrides_profile() {
    let env = env_of(&[
        ("TIXSYNC_API_TOKEN", "device-token"),
        ("TIXSYNC_ORGANIZER", "other"),
        ("TIXSYNC_EVENTS", "  "),
    ]);
    let config = sync_config_from(&profile(), |key| env.get(key).cloned()).unwrap();

    assert_eq!(config.remote.api_url, "https://tix.example");
    assert_eq!(config.remote.organizer, "other");
    assert_eq!(config.events, vec!["democon".to_string()]);
}

#[test]
fn missing_token_is_a_config_error() {
    let error = sync_config_from(&profile(), |_| None).unwrap_err();
    assert!(matches!(error, CliError::Config(message) if message.contains("TIXSYNC_API_TOKEN")));
}

#[test]
fn merge_profile_keeps_omitted_values() {
    let merged = merge_profile(profile(), None, Some("  ".to_string()), Some("expo, democon")).unwrap();
    assert_eq!(merged.api_url.as_deref(), Some("https://tix.example"));
    assert_eq!(merged.organizer.as_deref(), Some("demo"));
    assert_eq!(merged.events, vec!["expo".to_string(), "democon".to_string()]);

    assert!(merge_profile(profile(), Some("tix.example".to_string()), None, None).is_err());
}

#[test]
fn cursor_lines_show_status_and_window() {
    let entry = CursorEntry {
        scope: SyncScope::new("orders", "democon"),
        cursor: SyncCursor::incomplete(
            Some("2024-05-01T10:00:00Z".to_string()),
            None,
            "2024-04-01T09:00:00Z",
        ),
        updated_at: 0,
    };

    let lines = format_cursor_lines(std::slice::from_ref(&entry));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("1970-01-01 00:00:00 UTC"));
    assert!(lines[0].contains("orders@democon"));
    assert!(lines[0].contains("incomplete:2024-04-01T09:00:00Z"));
    assert!(lines[0].contains("since=2024-05-01T10:00:00Z"));

    let item = cursor_to_item(&entry);
    assert_eq!(item.parent, "democon");
    assert_eq!(item.updated_at_iso, "1970-01-01 00:00:00 UTC");
}

#[test]
fn status_formatting() {
    assert_eq!(format_status(None), "unknown");
    assert_eq!(format_status(Some(&CursorStatus::Complete)), "complete");
    assert_eq!(format_sync_timestamp(i64::MAX), i64::MAX.to_string());
}

#[test]
fn retention_lines_list_purged_events() {
    let report = RetentionReport {
        scheduled: 3,
        deleted_orders: 1,
        unresolved_subevents: 0,
        purged_events: vec!["oldcon".to_string()],
    };
    assert_eq!(
        format_retention_lines(&report),
        vec![
            "retention  scheduled=3 deleted=1 unresolved_subevents=0".to_string(),
            "purged event oldcon".to_string(),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_requires_a_selection() {
    let dir = tempfile::tempdir().unwrap();
    let error = run_reset(None, None, false, &dir.path().join("replica.db"))
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_clears_matching_cursors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("replica.db");
    let db = open_database(&path).unwrap();
    let cursor = SyncCursor::complete(Some("2024-05-01T10:00:00Z".to_string()), None);
    db.save_cursor(&SyncScope::new("orders", "democon"), &cursor)
        .await
        .unwrap();
    db.save_cursor(&SyncScope::new("orders", "expo"), &cursor)
        .await
        .unwrap();
    drop(db);

    run_reset(Some("democon"), None, false, &path).await.unwrap();

    let db = open_database(&path).unwrap();
    let remaining = db.list_cursors().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].scope.parent, "expo");
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_rejects_blank_key() {
    let dir = tempfile::tempdir().unwrap();
    let error = run_lookup("  ", "orderpositions", false, &dir.path().join("replica.db"))
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::EmptyLookupKey));
}
