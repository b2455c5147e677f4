use std::path::Path;

use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::json;
use studycollab_core::models::{
    ConflictChoice, OperationType, SyncError, SyncErrorKind, SyncPriority, SyncQueueItem,
};
use studycollab_core::sync::{DrainOptions, DrainStatus, SyncReport};
use studycollab_core::{CoreConfig, Identity};

use crate::cli::{CacheCommands, Cli, Commands, KeepSide, QueueCommands};
use crate::commands::common::{
    format_queue_lines, format_relative_time, format_sync_timestamp, normalize_cache_key,
    parse_json_arg, queue_item_to_list_item, resolve_error_id, short_id, CliContext,
};
use crate::commands::config::{normalize_supabase_url, run_config_init};
use crate::commands::sync::format_sync_report;
use crate::error::CliError;
use crate::remote::CliRemote;

fn test_context(dir: &Path, identity: Option<Identity>) -> CliContext {
    CliContext {
        db_path: dir.join("data").join("studycollab.db"),
        config_path: dir.join("config").join("config.json"),
        config: CoreConfig::default(),
        identity,
    }
}

fn sync_error(id: &str) -> SyncError {
    let item = SyncQueueItem::new(OperationType::Update, "tasks", json!({"id": "t1"}), 1_000);
    let mut error = SyncError::new(item, SyncErrorKind::Network, "boom", 2_000);
    error.id = id.to_string();
    error
}

#[test]
fn normalize_cache_key_trims_and_rejects_empty() {
    assert_eq!(normalize_cache_key("  tasks:t1 ").unwrap(), "tasks:t1");
    assert!(matches!(normalize_cache_key(" \t "), Err(CliError::EmptyKey)));
}

#[test]
fn parse_json_arg_reports_invalid_json() {
    assert_eq!(parse_json_arg(r#" {"id": "t1"} "#).unwrap(), json!({"id": "t1"}));
    assert!(matches!(
        parse_json_arg("{id: t1}"),
        Err(CliError::InvalidJson(_))
    ));
}

#[test]
fn resolve_error_id_accepts_exact_and_unique_prefix() {
    let errors = vec![sync_error("0190aaaa-1"), sync_error("0190bbbb-2")];

    assert_eq!(resolve_error_id(&errors, "0190aaaa-1").unwrap(), "0190aaaa-1");
    assert_eq!(resolve_error_id(&errors, "0190b").unwrap(), "0190bbbb-2");
    assert!(matches!(
        resolve_error_id(&errors, "0190"),
        Err(CliError::AmbiguousId(_))
    ));
    assert!(matches!(
        resolve_error_id(&errors, "ffff"),
        Err(CliError::SyncErrorNotFound(_))
    ));
    assert!(matches!(
        resolve_error_id(&errors, "  "),
        Err(CliError::SyncErrorNotFound(_))
    ));
}

#[test]
fn relative_time_buckets() {
    let now = 10 * 24 * 60 * 60 * 1000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 3 * 60_000, now), "3m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 8 * 24 * 60 * 60_000, now), "1w ago");
}

#[test]
fn sync_timestamp_is_utc() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
    assert_eq!(format_sync_timestamp(i64::MAX), i64::MAX.to_string());
}

#[test]
fn short_id_truncates_long_ids() {
    assert_eq!(short_id("0190c6f2-7a4b-7cc1-b0a5"), "0190c6f2-7a4b");
    assert_eq!(short_id("abc"), "abc");
}

#[test]
fn supabase_url_requires_http_scheme() {
    assert_eq!(
        normalize_supabase_url(Some(" https://demo.supabase.co/ ".to_string())).unwrap(),
        Some("https://demo.supabase.co".to_string())
    );
    assert_eq!(normalize_supabase_url(Some("  ".to_string())).unwrap(), None);
    assert!(normalize_supabase_url(Some("demo.supabase.co".to_string())).is_err());
}

#[test]
fn sync_report_lines_describe_outcome() {
    let report = SyncReport {
        attempted: 3,
        committed: 2,
        retried: 1,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report(&report, 1, 0),
        vec![
            "Sync completed: 2 committed, 1 retrying, 0 failed, 0 conflicts".to_string(),
            "1 change(s) still pending".to_string(),
        ]
    );

    let offline = SyncReport {
        status: DrainStatus::Offline,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report(&offline, 0, 2),
        vec![
            "Offline; changes stay queued".to_string(),
            "2 sync error(s); see `studycollab errors list`".to_string(),
        ]
    );
}

#[test]
fn queue_lines_show_retry_state() {
    let mut item = SyncQueueItem::new(OperationType::Update, "tasks", json!({"id": "t1"}), 0)
        .with_priority(SyncPriority::High);
    item.id = "item-1".to_string();
    item.retry_count = 2;

    let lines = format_queue_lines(&[item.clone()], 120_000);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("item-1"));
    assert!(lines[0].contains("HIGH"));
    assert!(lines[0].contains("tasks/t1"));
    assert!(lines[0].contains("retry 2/"));

    let list_item = queue_item_to_list_item(&item, 120_000);
    assert_eq!(list_item.entity_id, "t1");
    assert_eq!(list_item.relative_time, "2m ago");
}

#[test]
fn cli_parses_queue_add_with_priority() {
    let cli = Cli::try_parse_from([
        "studycollab",
        "queue",
        "add",
        "create",
        "tasks",
        r#"{"title": "Read ch. 4"}"#,
        "--priority",
        "high",
    ])
    .unwrap();

    match cli.command {
        Commands::Queue {
            command:
                QueueCommands::Add {
                    op,
                    table,
                    priority,
                    ..
                },
        } => {
            assert_eq!(op, OperationType::Create);
            assert_eq!(table, "tasks");
            assert_eq!(priority, SyncPriority::High);
        }
        _ => panic!("expected queue add"),
    }
}

#[test]
fn cli_rejects_unknown_operation() {
    assert!(Cli::try_parse_from(["studycollab", "queue", "add", "upsert", "tasks", "{}"]).is_err());
}

#[test]
fn cli_parses_global_db_path_after_subcommand() {
    let cli = Cli::try_parse_from([
        "studycollab",
        "cache",
        "stats",
        "--db-path",
        "/tmp/sc.db",
    ])
    .unwrap();
    assert_eq!(cli.db_path.as_deref(), Some(Path::new("/tmp/sc.db")));
    assert!(matches!(
        cli.command,
        Commands::Cache {
            command: CacheCommands::Stats { json: false }
        }
    ));
}

#[test]
fn keep_side_maps_to_conflict_choice() {
    assert_eq!(ConflictChoice::from(KeepSide::Local), ConflictChoice::KeepLocal);
    assert_eq!(ConflictChoice::from(KeepSide::Remote), ConflictChoice::KeepRemote);
}

#[test]
fn context_without_remote_uses_offline_store() {
    let dir = tempfile::tempdir().unwrap();
    let context = test_context(dir.path(), Some(Identity::new("user-1", "token")));
    assert!(context.build_remote().unwrap().is_offline());

    let mut configured = test_context(dir.path(), None);
    configured.config.remote.supabase_url = Some("https://demo.supabase.co".to_string());
    configured.config.remote.supabase_anon_key = Some("anon".to_string());
    assert!(configured.build_remote().unwrap().is_offline());
    assert!(matches!(configured.identity(), Err(CliError::NotSignedIn)));
}

#[test]
fn config_init_writes_remote_settings() {
    let dir = tempfile::tempdir().unwrap();
    let context = test_context(dir.path(), None);

    run_config_init(
        &context,
        Some("https://demo.supabase.co/".to_string()),
        Some("anon".to_string()),
        None,
    )
    .unwrap();

    let saved = CoreConfig::load(&context.config_path).unwrap();
    assert_eq!(
        saved.remote.supabase_url.as_deref(),
        Some("https://demo.supabase.co")
    );
    assert!(saved.remote.is_configured());
}

#[tokio::test(flavor = "current_thread")]
async fn queued_changes_survive_reopen_without_remote() {
    let dir = tempfile::tempdir().unwrap();
    let context = test_context(dir.path(), Some(Identity::new("user-1", "token")));

    {
        let store = context.open_store().await.unwrap();
        store
            .apply_local(
                OperationType::Create,
                "tasks",
                json!({"id": "t1", "title": "Read ch. 4"}),
                SyncPriority::Medium,
            )
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = context.open_store().await.unwrap();
    let items = store.queue_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].entity_id(), "t1");

    let cached = store.cache_get("tasks:t1").await.unwrap();
    assert!(cached.dirty);

    store.refresh_network().await;
    let report = store.drain(DrainOptions::manual()).await.unwrap();
    assert_eq!(report.status, DrainStatus::Offline);
    assert_eq!(store.queue_items().await.len(), 1);
    store.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn cache_rows_persist_between_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let context = test_context(dir.path(), None);

    {
        let store = context.open_store().await.unwrap();
        store
            .cache_put("resources:r1", json!({"id": "r1", "url": "https://example.com"}), None)
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = context.open_store().await.unwrap();
    let entry = store.cache_get("resources:r1").await.unwrap();
    assert_eq!(entry.data["url"], "https://example.com");
    assert!(!entry.dirty);
    assert!(store.cache_evict("resources:r1").await.unwrap());
    assert!(matches!(store.remote(), CliRemote::Offline(_)));
    store.close().await.unwrap();
}
