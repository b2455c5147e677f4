use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use studycollab_core::host::LogHostBridge;
use studycollab_core::models::{SyncConflict, SyncError, SyncQueueItem};
use studycollab_core::sync::{HttpRemoteStore, OfflineRemote};
use studycollab_core::util::unix_millis_now;
use studycollab_core::{CoreConfig, Identity, OfflineStore};

use crate::error::CliError;
use crate::remote::CliRemote;

pub const ENV_DB_PATH: &str = "STUDYCOLLAB_DB_PATH";
pub const ENV_CONFIG_PATH: &str = "STUDYCOLLAB_CONFIG";

pub type CliStore = OfflineStore<CliRemote>;

/// Resolved paths, configuration and identity for one invocation
#[derive(Debug)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub config: CoreConfig,
    pub identity: Option<Identity>,
}

impl CliContext {
    pub fn load(
        cli_db_path: Option<PathBuf>,
        cli_config_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = resolve_config_path(cli_config_path);
        let config = CoreConfig::load(&config_path)?.with_env_overrides(|key| env::var(key).ok())?;
        Ok(Self {
            db_path: resolve_db_path(cli_db_path),
            config_path,
            config,
            identity: Identity::from_env(|key| env::var(key).ok()),
        })
    }

    pub fn identity(&self) -> Result<&Identity, CliError> {
        self.identity.as_ref().ok_or(CliError::NotSignedIn)
    }

    pub fn build_remote(&self) -> Result<CliRemote, CliError> {
        match &self.identity {
            Some(identity) if self.config.remote.is_configured() => {
                let remote = HttpRemoteStore::new(
                    &self.config.remote,
                    identity,
                    self.config.sync.request_timeout(),
                )?;
                Ok(CliRemote::Http(remote))
            }
            _ => {
                tracing::debug!("No remote configured, changes stay queued locally");
                Ok(CliRemote::Offline(OfflineRemote))
            }
        }
    }

    pub async fn open_store(&self) -> Result<CliStore, CliError> {
        let remote = self.build_remote()?;
        ensure_parent_dir(&self.db_path)?;
        let store = OfflineStore::open(&self.db_path, self.config.clone(), remote)
            .await?
            .with_host_bridge(Arc::new(LogHostBridge));
        store.set_identity(self.identity.clone()).await;
        Ok(store)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    app_dir(dirs::data_dir()).join("studycollab.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join("config.json")
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("studycollab")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn parse_json_arg(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw.trim()).map_err(|error| CliError::InvalidJson(error.to_string()))
}

pub fn normalize_cache_key(key: &str) -> Result<String, CliError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::EmptyKey);
    }
    Ok(key.to_string())
}

/// Resolve a full sync error id from an exact id or a unique prefix.
pub fn resolve_error_id(errors: &[SyncError], id: &str) -> Result<String, CliError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CliError::SyncErrorNotFound(id.to_string()));
    }
    if let Some(error) = errors.iter().find(|error| error.id == id) {
        return Ok(error.id.clone());
    }

    let matches = errors
        .iter()
        .filter(|error| error.id.starts_with(id))
        .collect::<Vec<_>>();
    match matches.as_slice() {
        [] => Err(CliError::SyncErrorNotFound(id.to_string())),
        [error] => Ok(error.id.clone()),
        _ => Err(CliError::AmbiguousId(format!(
            "Sync error id prefix '{id}' matches {} errors; use a longer prefix",
            matches.len()
        ))),
    }
}

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: String,
    pub op: String,
    pub table: String,
    pub entity_id: String,
    pub priority: String,
    pub state: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub queued_at: i64,
    pub next_attempt_at: Option<i64>,
    pub relative_time: String,
}

pub fn queue_item_to_list_item(item: &SyncQueueItem, now_ms: i64) -> QueueListItem {
    QueueListItem {
        id: item.id.clone(),
        op: item.op.to_string(),
        table: item.table.clone(),
        entity_id: item.entity_id(),
        priority: item.priority.as_str().to_string(),
        state: item.state.as_str().to_string(),
        retry_count: item.retry_count,
        max_retries: item.max_retries,
        queued_at: item.timestamp,
        next_attempt_at: item.next_attempt_at,
        relative_time: format_relative_time(item.timestamp, now_ms),
    }
}

pub fn format_queue_lines(items: &[SyncQueueItem], now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short_id = short_id(&item.id);
            let target = format!("{}/{}", item.table, item.entity_id());
            let mut line = format!(
                "{short_id:<13}  {:<6}  {:<6}  {target:<40}  {}",
                item.priority.as_str(),
                item.op,
                format_relative_time(item.timestamp, now_ms)
            );
            if item.retry_count > 0 {
                line.push_str(&format!("  retry {}/{}", item.retry_count, item.max_retries));
            }
            if let Some(next) = item.next_attempt_at.filter(|next| *next > now_ms) {
                line.push_str(&format!("  next {}", format_sync_timestamp(next)));
            }
            line
        })
        .collect()
}

pub fn format_error_lines(errors: &[SyncError], now_ms: i64) -> Vec<String> {
    errors
        .iter()
        .map(|error| {
            format!(
                "{:<13}  {:<11}  {} {}/{}  {}  ({})",
                short_id(&error.id),
                error.kind.as_str(),
                error.item.op,
                error.table,
                error.item.entity_id(),
                error.message,
                format_relative_time(error.timestamp, now_ms)
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub table: String,
    pub entity_id: String,
    pub op: String,
    pub strategy: String,
    pub local_updated_at: i64,
    pub remote_updated_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub resolved_at_iso: Option<String>,
    pub pending: bool,
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        table: conflict.table.clone(),
        entity_id: conflict.entity_id.clone(),
        op: conflict.op.to_string(),
        strategy: conflict.strategy.to_string(),
        local_updated_at: conflict.local_updated_at,
        remote_updated_at: conflict.remote_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: conflict.resolved_at.map(format_sync_timestamp),
        pending: conflict.is_pending(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let resolved = conflict
                .resolved_at
                .map_or_else(|| "pending".to_string(), format_sync_timestamp);
            let remote = conflict
                .remote_updated_at
                .map_or_else(|| "-".to_string(), |value| value.to_string());
            format!(
                "#{:<5} {resolved:<23}  {:<12}  {}/{}  local={} remote={remote}",
                conflict.id,
                conflict.strategy,
                conflict.table,
                conflict.entity_id,
                conflict.local_updated_at,
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn short_id(id: &str) -> &str {
    id.get(..13).unwrap_or(id)
}

pub fn now_ms() -> i64 {
    unix_millis_now()
}
