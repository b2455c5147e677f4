use crate::cli::ErrorCommands;
use crate::commands::common::{format_error_lines, now_ms, resolve_error_id, CliContext};
use crate::error::CliError;

pub async fn run_errors(context: &CliContext, command: ErrorCommands) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let errors = store.sync_errors().await;
    match command {
        ErrorCommands::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&errors)?);
            } else if errors.is_empty() {
                println!("No sync errors.");
            } else {
                for line in format_error_lines(&errors, now_ms()) {
                    println!("{line}");
                }
            }
        }
        ErrorCommands::Retry { id } => {
            let id = resolve_error_id(&errors, &id)?;
            let item = store.retry_error(&id).await?;
            println!("Re-queued {} {}/{}", item.op, item.table, item.entity_id());
        }
        ErrorCommands::Dismiss { id } => {
            let id = resolve_error_id(&errors, &id)?;
            store.dismiss_error(&id).await?;
            println!("Dismissed sync error {id}");
        }
    }
    store.close().await?;
    Ok(())
}
