use serde::Serialize;
use studycollab_core::models::{CacheStats, NetworkStatus};

use crate::commands::common::CliContext;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusReport {
    db_path: String,
    config_path: String,
    remote_configured: bool,
    user_id: Option<String>,
    strategy: String,
    network: NetworkStatus,
    is_offline_mode: bool,
    pending_changes: usize,
    sync_errors: usize,
    cache: CacheStats,
}

pub async fn run_status(context: &CliContext, probe: bool, as_json: bool) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let network = if probe {
        store.refresh_network().await
    } else {
        store.network_status().await
    };
    let state = store.state().await;
    let report = StatusReport {
        db_path: context.db_path.display().to_string(),
        config_path: context.config_path.display().to_string(),
        remote_configured: !store.remote().is_offline(),
        user_id: context.identity.as_ref().map(|identity| identity.user_id.clone()),
        strategy: context.config.sync.strategy.to_string(),
        network,
        is_offline_mode: state.is_offline_mode,
        pending_changes: state.pending_changes,
        sync_errors: state.sync_errors.len(),
        cache: store.cache_stats().await,
    };
    store.close().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let connectivity = if report.network.online {
        format!("online ({:?})", report.network.effective_type)
    } else {
        "offline".to_string()
    };
    println!("Database:      {}", report.db_path);
    println!("Config:        {}", report.config_path);
    println!(
        "Remote:        {}",
        if report.remote_configured {
            "configured"
        } else {
            "not configured"
        }
    );
    println!(
        "User:          {}",
        report.user_id.as_deref().unwrap_or("not signed in")
    );
    println!("Strategy:      {}", report.strategy);
    println!("Network:       {connectivity}");
    if report.is_offline_mode {
        println!("Offline mode:  on");
    }
    println!("Pending:       {}", report.pending_changes);
    println!("Sync errors:   {}", report.sync_errors);
    println!(
        "Cache:         {} entries, {} bytes, hit rate {:.0}%",
        report.cache.total_entries,
        report.cache.total_size,
        report.cache.hit_rate * 100.0
    );
    Ok(())
}
