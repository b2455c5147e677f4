use crate::commands::common::{format_sync_timestamp, CliContext};
use crate::error::CliError;

pub async fn run_pull(
    context: &CliContext,
    table: &str,
    since: Option<i64>,
) -> Result<(), CliError> {
    context.identity()?;
    let store = context.open_store().await?;
    let report = store.pull_since(table.trim(), since).await;
    store.close().await?;
    let report = report?;

    let window = since.map_or_else(
        || "all rows".to_string(),
        |since| format!("rows since {}", format_sync_timestamp(since)),
    );
    println!(
        "Pulled {} {table} {window}: {} cached, {} kept local",
        report.fetched, report.cached, report.skipped_dirty
    );
    Ok(())
}
