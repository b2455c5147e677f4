use crate::cli::QueueCommands;
use crate::commands::common::{
    format_queue_lines, now_ms, parse_json_arg, queue_item_to_list_item, CliContext, QueueListItem,
};
use crate::error::CliError;

pub async fn run_queue(context: &CliContext, command: QueueCommands) -> Result<(), CliError> {
    let store = context.open_store().await?;
    match command {
        QueueCommands::List { json } => {
            let items = store.queue_items().await;
            let now = now_ms();
            if json {
                let json_items = items
                    .iter()
                    .map(|item| queue_item_to_list_item(item, now))
                    .collect::<Vec<QueueListItem>>();
                println!("{}", serde_json::to_string_pretty(&json_items)?);
            } else if items.is_empty() {
                println!("No pending changes.");
            } else {
                for line in format_queue_lines(&items, now) {
                    println!("{line}");
                }
            }
        }
        QueueCommands::Add {
            op,
            table,
            data,
            priority,
        } => {
            context.identity()?;
            let data = parse_json_arg(&data)?;
            let item = store.apply_local(op, table.trim(), data, priority).await?;
            println!(
                "Queued {} {}/{} ({})",
                item.op,
                item.table,
                item.entity_id(),
                item.id
            );
        }
    }
    store.close().await?;
    Ok(())
}
