//! Offline-first store: cache, durable sync queue and drain loop behind one
//! async handle.
//!
//! Every mutation updates libSQL before the in-memory structures, so a crash
//! between the two leaves the durable copy ahead, never behind.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::{self, Identity};
use crate::cache::{cache_key, CacheStore};
use crate::clock::{system_clock, SharedClock};
use crate::config::CoreConfig;
use crate::db::{
    CacheRepository, ConflictRepository, Database, LibSqlCacheRepository, LibSqlSyncRepository,
    SyncErrorRepository, SyncQueueRepository,
};
use crate::error::{Error, Result};
use crate::host::{HostBridge, NoopHostBridge};
use crate::models::{
    CacheEntry, CacheStats, ConflictChoice, ConflictResolution, ItemState, NetworkStatus,
    OfflineState, OperationType, SyncConflict, SyncError, SyncErrorKind, SyncPriority,
    SyncQueueItem,
};
use crate::sync::{
    DrainOptions, DrainStatus, ItemOutcome, RemoteStore, RetryDecision, SyncEngine, SyncQueue,
    SyncReport,
};
use crate::util::record_id;

/// Result of pulling remote rows into the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub fetched: usize,
    pub cached: usize,
    /// Rows left alone because a local change is still pending
    pub skipped_dirty: usize,
}

struct Inner {
    db: Database,
    cache: CacheStore,
    queue: SyncQueue,
    errors: Vec<SyncError>,
    identity: Option<Identity>,
    network: NetworkStatus,
    offline_mode: bool,
    last_sync_time: Option<i64>,
}

impl Inner {
    async fn write_cache(
        &mut self,
        key: &str,
        data: Value,
        ttl_ms: Option<u64>,
        dirty: bool,
    ) -> Result<CacheEntry> {
        let entry = self.cache.prepare(key, data, ttl_ms, dirty);
        let repo = LibSqlCacheRepository::new(self.db.connection());
        repo.upsert(&entry).await?;
        let evicted = self.cache.insert(entry.clone());
        for key in &evicted {
            repo.delete(key).await?;
        }
        Ok(entry)
    }

    async fn drop_cache(&mut self, key: &str) -> Result<bool> {
        LibSqlCacheRepository::new(self.db.connection())
            .delete(key)
            .await?;
        Ok(self.cache.evict(key))
    }

    async fn store_item(&mut self, item: SyncQueueItem) -> Result<()> {
        LibSqlSyncRepository::new(self.db.connection())
            .upsert_item(&item)
            .await?;
        if self.queue.get(&item.id).is_some() {
            self.queue.replace(item);
        } else {
            self.queue.push(item);
        }
        Ok(())
    }

    async fn remove_item(&mut self, id: &str) -> Result<Option<SyncQueueItem>> {
        LibSqlSyncRepository::new(self.db.connection())
            .delete_item(id)
            .await?;
        Ok(self.queue.remove(id))
    }

    async fn record_error(&mut self, error: SyncError) -> Result<()> {
        LibSqlSyncRepository::new(self.db.connection())
            .insert_error(&error)
            .await?;
        self.errors.retain(|existing| existing.item_id != error.item_id);
        self.errors.push(error);
        Ok(())
    }

    async fn log_conflict(&self, conflict: &SyncConflict) -> Result<i64> {
        LibSqlSyncRepository::new(self.db.connection())
            .record_conflict(conflict)
            .await
    }

    fn queued_for(&self, entity_key: &str) -> Vec<SyncQueueItem> {
        self.queue
            .items()
            .iter()
            .filter(|item| item.entity_key() == entity_key)
            .cloned()
            .collect()
    }

    /// Bring the cache in line with a committed write.
    async fn settle_cache(
        &mut self,
        item: &SyncQueueItem,
        key: &str,
        remote: Option<Value>,
    ) -> Result<()> {
        let pending = self.queued_for(key);

        if !pending.is_empty() {
            // Later local edits own the cache view; rebase them on the stored row
            if let Some(row) = remote {
                for mut next in pending {
                    next.base = Some(row.clone());
                    self.store_item(next).await?;
                }
            }
            return Ok(());
        }

        if item.op == OperationType::Delete {
            self.drop_cache(key).await?;
            return Ok(());
        }

        match remote {
            Some(row) => {
                self.write_cache(key, row, None, false).await?;
            }
            None => {
                if let Some(entry) = self.cache.mark_clean(key) {
                    LibSqlCacheRepository::new(self.db.connection())
                        .upsert(&entry)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

/// Resets the drain flag when a drain ends, including on early return.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Offline cache and sync queue over a `RemoteStore`
pub struct OfflineStore<R> {
    inner: Mutex<Inner>,
    engine: SyncEngine<R>,
    config: CoreConfig,
    clock: SharedClock,
    host: Arc<dyn HostBridge>,
    draining: AtomicBool,
}

impl<R: RemoteStore> OfflineStore<R> {
    /// Open a store backed by the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, config: CoreConfig, remote: R) -> Result<Self> {
        let db = Database::open(path).await?;
        Self::with_database(db, config, remote, system_clock()).await
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory(config: CoreConfig, remote: R) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Self::with_database(db, config, remote, system_clock()).await
    }

    /// Build a store over an opened database, restoring the cache, queue and
    /// error list from it.
    pub async fn with_database(
        db: Database,
        config: CoreConfig,
        remote: R,
        clock: SharedClock,
    ) -> Result<Self> {
        let (entries, items, errors) = {
            let cache_repo = LibSqlCacheRepository::new(db.connection());
            let sync_repo = LibSqlSyncRepository::new(db.connection());
            (
                cache_repo.load_all().await?,
                sync_repo.load_items().await?,
                sync_repo.list_errors().await?,
            )
        };

        let mut cache = CacheStore::new(&config.cache, clock.clone());
        cache.restore(entries);
        tracing::info!(
            "Opened offline store: {} cached rows, {} queued changes, {} sync errors",
            cache.len(),
            items.len(),
            errors.len()
        );

        let engine = SyncEngine::new(
            remote,
            config.resource_policy.clone(),
            config.sync.request_timeout(),
            clock.clone(),
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                db,
                cache,
                queue: SyncQueue::new(items),
                errors,
                identity: None,
                network: NetworkStatus::online(),
                offline_mode: false,
                last_sync_time: None,
            }),
            engine,
            config,
            clock,
            host: Arc::new(NoopHostBridge),
            draining: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn with_host_bridge(mut self, host: Arc<dyn HostBridge>) -> Self {
        self.host = host;
        self
    }

    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub const fn remote(&self) -> &R {
        self.engine.remote()
    }

    /// Replace the signed-in identity; `None` signs out.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let mut inner = self.inner.lock().await;
        match &identity {
            Some(identity) => tracing::debug!("Signed in as {}", identity.user_id),
            None => tracing::debug!("Signed out"),
        }
        inner.identity = identity;
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.inner.lock().await.identity.clone()
    }

    // ---- cache ----

    /// Read a cached row. Expired and corrupted entries are purged and
    /// reported as misses.
    pub async fn cache_get(&self, key: &str) -> Result<CacheEntry> {
        let mut inner = self.inner.lock().await;
        match inner.cache.get(key) {
            Ok(entry) => Ok(entry),
            Err(error) => {
                LibSqlCacheRepository::new(inner.db.connection())
                    .delete(key)
                    .await?;
                Err(error)
            }
        }
    }

    /// Store a clean row; `ttl_ms` falls back to the configured default.
    pub async fn cache_put(
        &self,
        key: &str,
        data: Value,
        ttl_ms: Option<u64>,
    ) -> Result<CacheEntry> {
        if key.trim().is_empty() {
            return Err(Error::InvalidInput("cache key cannot be empty".to_string()));
        }
        let mut inner = self.inner.lock().await;
        inner.write_cache(key, data, ttl_ms, false).await
    }

    pub async fn cache_evict(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        inner.drop_cache(key).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.lock().await.cache.stats()
    }

    /// Purge expired entries; returns how many were removed.
    pub async fn cache_cleanup(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let removed = inner.cache.cleanup();
        let repo = LibSqlCacheRepository::new(inner.db.connection());
        for key in &removed {
            repo.delete(key).await?;
        }
        Ok(removed.len())
    }

    /// Cached row for `table`/`id`, fetched from the remote store on a miss.
    pub async fn get_or_fetch(&self, table: &str, id: &str) -> Result<Option<CacheEntry>> {
        let key = cache_key(table, id);
        match self.cache_get(&key).await {
            Ok(entry) => return Ok(Some(entry)),
            Err(error) if error.is_cache_miss() => {}
            Err(error) => return Err(error),
        }

        let Some(row) = self.engine.fetch_row(table, id).await? else {
            return Ok(None);
        };

        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.cache.peek(&key).filter(|entry| entry.dirty) {
            return Ok(Some(entry.clone()));
        }
        inner.write_cache(&key, row, None, false).await.map(Some)
    }

    // ---- queue ----

    /// New queue item stamped with the current time and the policy's retry budget.
    pub fn new_item(&self, op: OperationType, table: &str, data: Value) -> SyncQueueItem {
        SyncQueueItem::new(op, table, data, self.clock.now_ms())
            .with_max_retries(self.config.resource_policy.max_retries)
    }

    /// Append an item to the queue with a fresh retry budget.
    pub async fn enqueue(&self, item: SyncQueueItem) -> Result<SyncQueueItem> {
        let mut inner = self.inner.lock().await;
        self.enqueue_locked(&mut inner, item).await
    }

    async fn enqueue_locked(
        &self,
        inner: &mut Inner,
        mut item: SyncQueueItem,
    ) -> Result<SyncQueueItem> {
        auth::require(inner.identity.as_ref(), self.clock.now_ms())?;
        validate_table(&item.table)?;

        item.retry_count = 0;
        item.state = ItemState::Pending;
        item.next_attempt_at = None;
        inner.store_item(item.clone()).await?;

        tracing::debug!(
            "Queued {} {} ({} pending)",
            item.op,
            item.entity_key(),
            inner.queue.len()
        );
        Ok(item)
    }

    /// Apply a local change optimistically and queue it for the remote store.
    ///
    /// The cache reflects the change immediately (marked dirty); the prior
    /// cached row becomes the item's merge base. Creates without an `id` get
    /// a generated one.
    pub async fn apply_local(
        &self,
        op: OperationType,
        table: &str,
        mut data: Value,
        priority: SyncPriority,
    ) -> Result<SyncQueueItem> {
        validate_table(table)?;
        if !data.is_object() {
            return Err(Error::Validation("row must be a JSON object".to_string()));
        }
        let id = match record_id(&data) {
            Some(id) => id,
            None if op == OperationType::Create => {
                let id = Uuid::now_v7().to_string();
                data["id"] = Value::String(id.clone());
                id
            }
            None => return Err(Error::Validation(format!("{op} requires a row id"))),
        };

        let mut inner = self.inner.lock().await;
        auth::require(inner.identity.as_ref(), self.clock.now_ms())?;

        let key = cache_key(table, &id);
        let base = inner.cache.peek(&key).map(|entry| entry.data.clone());
        let view = match (&base, op) {
            (_, OperationType::Delete) => None,
            (Some(Value::Object(current)), OperationType::Update) => {
                let mut merged = current.clone();
                if let Value::Object(patch) = &data {
                    for (field, value) in patch {
                        merged.insert(field.clone(), value.clone());
                    }
                }
                Some(Value::Object(merged))
            }
            _ => Some(data.clone()),
        };

        let item = self
            .new_item(op, table, data)
            .with_priority(priority)
            .with_base(base);
        let item = self.enqueue_locked(&mut inner, item).await?;

        let applied = match view {
            Some(view) => inner.write_cache(&key, view, None, true).await.map(drop),
            None => inner.drop_cache(&key).await.map(drop),
        };
        if let Err(error) = applied {
            // Queue and cache change together or not at all
            if let Err(rollback) = inner.remove_item(&item.id).await {
                tracing::warn!("Failed to withdraw {} after cache error: {rollback}", item.id);
            }
            return Err(error);
        }
        Ok(item)
    }

    /// Queue items in drain order.
    pub async fn queue_items(&self) -> Vec<SyncQueueItem> {
        let inner = self.inner.lock().await;
        inner.queue.ordered().into_iter().cloned().collect()
    }

    // ---- drain ----

    /// Replay due queue items against the remote store.
    ///
    /// Items run one at a time in priority order, with items for the same
    /// entity kept in enqueue order. The store lock is released while a
    /// remote call is in flight. Credentials rejected by the remote store
    /// abort the drain with `Unauthenticated`.
    pub async fn drain(&self, options: DrainOptions) -> Result<SyncReport> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return Err(Error::SyncInProgress);
        }
        let _guard = DrainGuard(&self.draining);
        let started = Instant::now();
        let strategy = options.strategy.unwrap_or(self.config.sync.strategy);
        let resolution = options
            .resolution
            .unwrap_or(self.config.sync.conflict_resolution);

        let limit = {
            let inner = self.inner.lock().await;
            auth::require(inner.identity.as_ref(), self.clock.now_ms())?;
            let status = if inner.offline_mode {
                Err(DrainStatus::OfflineMode)
            } else {
                self.engine
                    .batch_limit(strategy, options.manual, &inner.network)
            };
            match status {
                Ok(limit) => limit,
                Err(status) => {
                    tracing::debug!("Sync skipped ({strategy}): {status:?}");
                    return Ok(SyncReport::not_run(strategy, status, inner.queue.len()));
                }
            }
        };

        let mut report = SyncReport {
            strategy: Some(strategy),
            ..SyncReport::default()
        };
        let mut attempted = HashSet::new();

        while report.attempted < limit {
            if options.is_cancelled() {
                report.cancelled = true;
                report.status = DrainStatus::Cancelled;
                break;
            }

            let item = {
                let mut inner = self.inner.lock().await;
                let now = self.clock.now_ms();
                let Some(item) = inner.queue.next_ready(now, &attempted).cloned() else {
                    break;
                };
                let mut in_flight = item.clone();
                in_flight.state = ItemState::InFlight;
                inner.queue.replace(in_flight);
                item
            };

            attempted.insert(item.id.clone());
            report.attempted += 1;

            let outcome = self.engine.process(&item, resolution).await;
            let mut inner = self.inner.lock().await;
            self.apply_outcome(&mut inner, item, outcome, &mut report)
                .await?;
        }

        let mut inner = self.inner.lock().await;
        report.skipped = inner
            .queue
            .items()
            .iter()
            .filter(|item| !attempted.contains(&item.id))
            .count();
        if report.status == DrainStatus::Completed {
            inner.last_sync_time = Some(self.clock.now_ms());
        }
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            "Sync finished ({strategy}): {} committed, {} retried, {} failed, {} conflicts, {} pending",
            report.committed,
            report.retried,
            report.failed,
            report.conflicts,
            inner.queue.len()
        );
        Ok(report)
    }

    async fn apply_outcome(
        &self,
        inner: &mut Inner,
        item: SyncQueueItem,
        outcome: ItemOutcome,
        report: &mut SyncReport,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        let key = item.entity_key();

        match outcome {
            ItemOutcome::Committed { remote, conflict } => {
                inner.remove_item(&item.id).await?;
                if let Some(conflict) = conflict {
                    inner.log_conflict(&conflict).await?;
                    report.conflicts += 1;
                }
                inner.settle_cache(&item, &key, remote).await?;
                report.committed += 1;
                tracing::debug!("Committed {} {key}", item.op);
            }
            ItemOutcome::ServerWins { remote, conflict } => {
                inner.remove_item(&item.id).await?;
                inner.log_conflict(&conflict).await?;
                inner.write_cache(&key, remote, None, false).await?;

                let message = format!("local {} discarded; server version kept", item.op);
                self.host
                    .notify("Sync conflict", &format!("{key}: {message}"));
                inner
                    .record_error(SyncError::new(item, SyncErrorKind::Conflict, message, now))
                    .await?;
                report.conflicts += 1;
            }
            ItemOutcome::Parked { conflict } => {
                inner.remove_item(&item.id).await?;
                let id = inner.log_conflict(&conflict).await?;
                self.host.notify(
                    "Sync conflict needs review",
                    &format!("{key}: conflict #{id} is waiting for a decision"),
                );
                report.conflicts += 1;
            }
            ItemOutcome::Retry { error } => {
                let mut item = item;
                match self.engine.schedule_retry(&mut item, now) {
                    RetryDecision::Scheduled { delay_ms } => {
                        tracing::warn!(
                            "Sync of {key} failed ({error}); retry {}/{} in {delay_ms} ms",
                            item.retry_count,
                            item.max_retries
                        );
                        inner.store_item(item).await?;
                        report.retried += 1;
                    }
                    RetryDecision::Exhausted => {
                        let exhausted = Error::ExhaustedRetries {
                            item_id: item.id.clone(),
                            attempts: item.retry_count,
                        };
                        tracing::warn!("{exhausted}: {error}");
                        inner.remove_item(&item.id).await?;
                        inner
                            .record_error(SyncError::new(
                                item,
                                error.kind(),
                                format!("{exhausted}: {error}"),
                                now,
                            ))
                            .await?;
                        report.failed += 1;
                    }
                }
            }
            ItemOutcome::Failed { kind, message } => {
                tracing::warn!("Sync of {key} failed permanently: {message}");
                inner.remove_item(&item.id).await?;
                inner
                    .record_error(SyncError::new(item, kind, message, now))
                    .await?;
                report.failed += 1;
            }
            ItemOutcome::Unauthorized(message) => {
                inner.queue.replace(item);
                tracing::warn!("Sync stopped, credentials rejected: {message}");
                return Err(Error::Unauthenticated(message));
            }
        }
        Ok(())
    }

    /// Pull rows changed remotely since `since` into the cache.
    ///
    /// Rows with a pending local change are skipped so the optimistic view
    /// is not overwritten before the change is replayed.
    pub async fn pull_since(&self, table: &str, since: Option<i64>) -> Result<PullReport> {
        validate_table(table)?;
        let user_id = {
            let inner = self.inner.lock().await;
            if inner.offline_mode {
                return Err(Error::Network("offline mode is enabled".to_string()));
            }
            auth::require(inner.identity.as_ref(), self.clock.now_ms())?
                .user_id
                .clone()
        };

        let rows = self.engine.fetch_since(table, &user_id, since).await?;

        let mut inner = self.inner.lock().await;
        let mut report = PullReport {
            fetched: rows.len(),
            ..PullReport::default()
        };
        for row in rows {
            let Some(id) = record_id(&row) else {
                tracing::warn!("Skipping {table} row without an id");
                continue;
            };
            let key = cache_key(table, &id);
            let dirty = inner.cache.peek(&key).is_some_and(|entry| entry.dirty);
            if dirty || !inner.queued_for(&key).is_empty() {
                report.skipped_dirty += 1;
                continue;
            }
            inner.write_cache(&key, row, None, false).await?;
            report.cached += 1;
        }
        inner.last_sync_time = Some(self.clock.now_ms());

        tracing::info!(
            "Pulled {} {table} rows ({} cached, {} with pending local changes)",
            report.fetched,
            report.cached,
            report.skipped_dirty
        );
        Ok(report)
    }

    // ---- state ----

    pub async fn state(&self) -> OfflineState {
        let inner = self.inner.lock().await;
        OfflineState {
            is_online: inner.network.online,
            is_offline_mode: inner.offline_mode,
            last_sync_time: inner.last_sync_time,
            sync_in_progress: self.draining.load(Ordering::SeqCst),
            pending_changes: inner.queue.len(),
            cache_size: inner.cache.len(),
            sync_errors: inner.errors.clone(),
        }
    }

    pub async fn network_status(&self) -> NetworkStatus {
        self.inner.lock().await.network.clone()
    }

    /// Record a connectivity change. Returns true when the store just came
    /// back online, which is the caller's cue to drain.
    pub async fn set_network_status(&self, status: NetworkStatus) -> bool {
        let mut inner = self.inner.lock().await;
        let reconnected = !inner.network.online && status.online;
        if inner.network.online != status.online {
            if status.online {
                tracing::info!("Network is back online ({:?})", status.effective_type);
            } else {
                tracing::info!("Network went offline; changes will queue locally");
            }
        }
        inner.network = status;
        reconnected
    }

    /// Probe the remote store and record the result.
    pub async fn refresh_network(&self) -> NetworkStatus {
        let status = self.engine.probe().await;
        self.set_network_status(status.clone()).await;
        status
    }

    /// Force offline mode on or off; drains are skipped while it is on.
    pub async fn set_offline_mode(&self, enabled: bool) {
        let mut inner = self.inner.lock().await;
        if inner.offline_mode != enabled {
            tracing::info!("Offline mode {}", if enabled { "enabled" } else { "disabled" });
        }
        inner.offline_mode = enabled;
    }

    // ---- errors ----

    pub async fn sync_errors(&self) -> Vec<SyncError> {
        self.inner.lock().await.errors.clone()
    }

    /// Move a failed item back onto the queue with a fresh retry budget.
    pub async fn retry_error(&self, id: &str) -> Result<SyncQueueItem> {
        let mut inner = self.inner.lock().await;
        auth::require(inner.identity.as_ref(), self.clock.now_ms())?;
        let error = find_error(&inner.errors, id)?;

        LibSqlSyncRepository::new(inner.db.connection())
            .delete_error(id)
            .await?;
        inner.errors.retain(|existing| existing.id != id);

        tracing::info!("Retrying {} {}", error.item.op, error.item.entity_key());
        self.enqueue_locked(&mut inner, error.item).await
    }

    /// Drop a failed item. A dirty cache view it left behind is evicted so the
    /// next read refetches the remote row.
    pub async fn dismiss_error(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let error = find_error(&inner.errors, id)?;

        LibSqlSyncRepository::new(inner.db.connection())
            .delete_error(id)
            .await?;
        inner.errors.retain(|existing| existing.id != id);

        let key = error.item.entity_key();
        let dirty = inner.cache.peek(&key).is_some_and(|entry| entry.dirty);
        if dirty && inner.queued_for(&key).is_empty() {
            inner.drop_cache(&key).await?;
        }
        tracing::info!("Dismissed sync error for {key}");
        Ok(())
    }

    // ---- conflicts ----

    pub async fn conflicts(&self, pending_only: bool, limit: usize) -> Result<Vec<SyncConflict>> {
        let inner = self.inner.lock().await;
        LibSqlSyncRepository::new(inner.db.connection())
            .list_conflicts(pending_only, limit)
            .await
    }

    /// Settle a parked conflict.
    ///
    /// `KeepLocal` queues the local payload at high priority and overwrites
    /// the remote row; `KeepRemote` writes the remote row to the cache.
    pub async fn resolve_conflict(&self, id: i64, choice: ConflictChoice) -> Result<SyncConflict> {
        let mut inner = self.inner.lock().await;
        let conflict = LibSqlSyncRepository::new(inner.db.connection())
            .get_conflict(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))?;
        if !conflict.is_pending() {
            return Err(Error::InvalidInput(format!(
                "conflict {id} is already resolved"
            )));
        }

        let key = cache_key(&conflict.table, &conflict.entity_id);
        let strategy = match choice {
            ConflictChoice::KeepLocal => {
                // The row exists remotely, so a parked create replays as an update
                let op = match conflict.op {
                    OperationType::Create => OperationType::Update,
                    op => op,
                };
                let item = self
                    .new_item(op, &conflict.table, conflict.local.clone())
                    .with_priority(SyncPriority::High)
                    .with_base(Some(conflict.remote.clone()))
                    .with_resolution(ConflictResolution::ClientWins);
                self.enqueue_locked(&mut inner, item).await?;
                ConflictResolution::ClientWins
            }
            ConflictChoice::KeepRemote => {
                inner
                    .write_cache(&key, conflict.remote.clone(), None, false)
                    .await?;
                ConflictResolution::ServerWins
            }
        };

        let resolved_at = self.clock.now_ms();
        LibSqlSyncRepository::new(inner.db.connection())
            .mark_conflict_resolved(id, strategy, resolved_at)
            .await?;
        tracing::info!("Resolved conflict #{id} on {key} with {strategy}");

        Ok(SyncConflict {
            resolved_at: Some(resolved_at),
            strategy,
            ..conflict
        })
    }

    // ---- lifecycle ----

    /// Rewrite the in-memory cache and queue to libSQL.
    pub async fn flush(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        let cache_repo = LibSqlCacheRepository::new(inner.db.connection());
        for entry in inner.cache.entries() {
            cache_repo.upsert(entry).await?;
        }
        let sync_repo = LibSqlSyncRepository::new(inner.db.connection());
        for item in inner.queue.items() {
            sync_repo.upsert_item(item).await?;
        }
        Ok(())
    }

    /// Flush and release the store.
    pub async fn close(self) -> Result<()> {
        self.flush().await?;
        let inner = self.inner.into_inner();
        tracing::info!(
            "Closed offline store with {} pending changes",
            inner.queue.len()
        );
        Ok(())
    }
}

fn validate_table(table: &str) -> Result<()> {
    if SyncQueueItem::is_known_table(table) {
        Ok(())
    } else {
        Err(Error::Validation(format!("unknown table '{table}'")))
    }
}

fn find_error(errors: &[SyncError], id: &str) -> Result<SyncError> {
    errors
        .iter()
        .find(|error| error.id == id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("sync error {id}")))
}
