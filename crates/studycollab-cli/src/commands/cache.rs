use crate::cli::CacheCommands;
use crate::commands::common::{
    format_relative_time, format_sync_timestamp, normalize_cache_key, now_ms, parse_json_arg,
    CliContext,
};
use crate::error::CliError;

pub async fn run_cache(context: &CliContext, command: CacheCommands) -> Result<(), CliError> {
    let store = context.open_store().await?;
    match command {
        CacheCommands::Get { key, json } => {
            let key = normalize_cache_key(&key)?;
            let entry = store.cache_get(&key).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&entry.data)?);
                let expires = entry
                    .expires_at
                    .map_or_else(|| "never".to_string(), format_sync_timestamp);
                eprintln!(
                    "cached {}  version {}  expires {expires}{}",
                    format_relative_time(entry.timestamp, now_ms()),
                    entry.version,
                    if entry.dirty { "  (unsynced)" } else { "" }
                );
            }
        }
        CacheCommands::Put { key, data, ttl_ms } => {
            let key = normalize_cache_key(&key)?;
            let data = parse_json_arg(&data)?;
            let entry = store.cache_put(&key, data, ttl_ms).await?;
            println!("Cached {key} (version {})", entry.version);
        }
        CacheCommands::Evict { key } => {
            let key = normalize_cache_key(&key)?;
            if store.cache_evict(&key).await? {
                println!("Evicted {key}");
            } else {
                println!("{key} was not cached");
            }
        }
        CacheCommands::Stats { json } => {
            let stats = store.cache_stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Entries:    {}", stats.total_entries);
                println!("Size:       {} bytes", stats.total_size);
                println!(
                    "Hits:       {} ({:.0}%)",
                    stats.hits,
                    stats.hit_rate * 100.0
                );
                println!(
                    "Misses:     {} ({:.0}%)",
                    stats.misses,
                    stats.miss_rate * 100.0
                );
                println!("Evictions:  {}", stats.evictions);
                if let Some(last_cleanup) = stats.last_cleanup {
                    println!("Cleanup:    {}", format_sync_timestamp(last_cleanup));
                }
            }
        }
        CacheCommands::Cleanup => {
            let removed = store.cache_cleanup().await?;
            println!("Removed {removed} expired entr{}", if removed == 1 { "y" } else { "ies" });
        }
    }
    store.close().await?;
    Ok(())
}
