use crate::cli::{ConflictCommands, KeepSide};
use crate::commands::common::{
    format_sync_conflict_lines, sync_conflict_to_item, CliContext, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_conflicts(
    context: &CliContext,
    command: ConflictCommands,
) -> Result<(), CliError> {
    let store = context.open_store().await?;
    match command {
        ConflictCommands::List {
            pending,
            limit,
            json,
        } => {
            let conflicts = store.conflicts(pending, limit).await?;
            if json {
                let json_items = conflicts
                    .iter()
                    .map(sync_conflict_to_item)
                    .collect::<Vec<SyncConflictItem>>();
                println!("{}", serde_json::to_string_pretty(&json_items)?);
            } else if conflicts.is_empty() {
                println!("No sync conflicts recorded.");
            } else {
                for line in format_sync_conflict_lines(&conflicts) {
                    println!("{line}");
                }
            }
        }
        ConflictCommands::Resolve { id, keep } => {
            let conflict = store.resolve_conflict(id, keep.into()).await?;
            println!(
                "Resolved conflict #{} on {}/{} keeping the {} version",
                conflict.id,
                conflict.table,
                conflict.entity_id,
                match keep {
                    KeepSide::Local => "local",
                    KeepSide::Remote => "remote",
                }
            );
        }
    }
    store.close().await?;
    Ok(())
}
