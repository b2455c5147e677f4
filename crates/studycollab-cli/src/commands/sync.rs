use studycollab_core::config::SyncStrategy;
use studycollab_core::models::ConflictResolution;
use studycollab_core::sync::{DrainOptions, DrainStatus, SyncReport};

use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_sync(
    context: &CliContext,
    strategy: Option<SyncStrategy>,
    resolution: Option<ConflictResolution>,
    as_json: bool,
) -> Result<(), CliError> {
    context.identity()?;
    let store = context.open_store().await?;
    if store.remote().is_offline() {
        tracing::warn!("No remote configured; run `studycollab config init` first");
    }
    store.refresh_network().await;

    let mut options = DrainOptions::manual();
    if let Some(strategy) = strategy {
        options = options.with_strategy(strategy);
    }
    if let Some(resolution) = resolution {
        options = options.with_resolution(resolution);
    }
    let report = store.drain(options).await;
    let pending = store.queue_items().await.len();
    let errors = store.sync_errors().await.len();
    store.close().await?;
    let report = report?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for line in format_sync_report(&report, pending, errors) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport, pending: usize, errors: usize) -> Vec<String> {
    let headline = match report.status {
        DrainStatus::Offline => "Offline; changes stay queued".to_string(),
        DrainStatus::OfflineMode => "Offline mode is on; changes stay queued".to_string(),
        DrainStatus::ManualOnly => "Sync strategy is MANUAL; nothing was sent".to_string(),
        DrainStatus::Cancelled => format!(
            "Sync cancelled after {} of {} changes",
            report.committed, report.attempted
        ),
        DrainStatus::Completed => format!(
            "Sync completed: {} committed, {} retrying, {} failed, {} conflicts",
            report.committed, report.retried, report.failed, report.conflicts
        ),
    };

    let mut lines = vec![headline];
    if pending > 0 {
        lines.push(format!("{pending} change(s) still pending"));
    }
    if errors > 0 {
        lines.push(format!(
            "{errors} sync error(s); see `studycollab errors list`"
        ));
    }
    lines
}
