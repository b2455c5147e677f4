//! Reconciliation engine: replays one queue item against the remote store.
//!
//! The engine is stateless with respect to the queue. It decides the outcome
//! of a single attempt and the retry schedule; the offline store applies
//! outcomes to the queue, cache and error list.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::conflict::{has_diverged, merge_records};
use super::remote::{RemoteError, RemoteResult, RemoteStore};
use super::Backoff;
use crate::clock::SharedClock;
use crate::config::{ResourcePolicy, SyncStrategy};
use crate::models::{
    ConflictResolution, ItemState, NetworkStatus, OperationType, SyncConflict, SyncErrorKind,
    SyncQueueItem,
};
use crate::util::updated_at_millis;

/// Cooperative cancellation flag checked between queue items
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parameters for one drain
#[derive(Debug, Clone, Default)]
pub struct DrainOptions {
    pub strategy: Option<SyncStrategy>,
    pub resolution: Option<ConflictResolution>,
    /// Explicit user request; required by `MANUAL`
    pub manual: bool,
    pub cancel: Option<CancelToken>,
}

impl DrainOptions {
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub const fn with_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// How a drain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainStatus {
    #[default]
    Completed,
    Cancelled,
    /// Network probe reported no connectivity
    Offline,
    /// Offline mode forced by the user
    OfflineMode,
    /// `MANUAL` strategy without an explicit request
    ManualOnly,
}

/// Summary of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub strategy: Option<SyncStrategy>,
    pub attempted: usize,
    pub committed: usize,
    pub retried: usize,
    pub failed: usize,
    pub conflicts: usize,
    /// Items left in the queue without an attempt in this drain
    pub skipped: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub status: DrainStatus,
}

impl SyncReport {
    pub fn not_run(strategy: SyncStrategy, status: DrainStatus, pending: usize) -> Self {
        Self {
            strategy: Some(strategy),
            skipped: pending,
            status,
            ..Self::default()
        }
    }
}

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Remote write confirmed; `remote` is the stored row when one exists
    Committed {
        remote: Option<Value>,
        conflict: Option<SyncConflict>,
    },
    /// Local change discarded in favor of the remote row
    ServerWins {
        remote: Value,
        conflict: SyncConflict,
    },
    /// Conflict parked for the user; neither side applied
    Parked { conflict: SyncConflict },
    /// Transient failure
    Retry { error: RemoteError },
    /// Permanent failure
    Failed { kind: SyncErrorKind, message: String },
    /// Credentials rejected; the drain must stop
    Unauthorized(String),
}

/// What happened to an item after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Scheduled { delay_ms: u64 },
    Exhausted,
}

/// Replays queue items against a `RemoteStore`
#[derive(Debug)]
pub struct SyncEngine<R> {
    remote: R,
    policy: ResourcePolicy,
    backoff: Backoff,
    request_timeout: Duration,
    clock: SharedClock,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Resolve the policy's backoff once at construction.
    pub fn new(
        remote: R,
        policy: ResourcePolicy,
        request_timeout: Duration,
        clock: SharedClock,
    ) -> Self {
        let backoff = policy.backoff();
        Self {
            remote,
            policy,
            backoff,
            request_timeout,
            clock,
        }
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Items allowed in one drain, or why the drain should not run.
    pub fn batch_limit(
        &self,
        strategy: SyncStrategy,
        manual: bool,
        network: &NetworkStatus,
    ) -> Result<usize, DrainStatus> {
        if !network.online {
            return Err(DrainStatus::Offline);
        }
        match strategy {
            SyncStrategy::Immediate => Ok(usize::MAX),
            SyncStrategy::Batched => Ok(self.policy.batch_size.max(1)),
            SyncStrategy::Manual if manual => Ok(usize::MAX),
            SyncStrategy::Manual => Err(DrainStatus::ManualOnly),
            SyncStrategy::Smart => match network.adapted_batch_size(self.policy.batch_size) {
                0 => Err(DrainStatus::Offline),
                limit => Ok(limit),
            },
        }
    }

    /// Count a transient failure against the item's retry budget.
    pub fn schedule_retry(&self, item: &mut SyncQueueItem, now_ms: i64) -> RetryDecision {
        let next = item.retry_count.saturating_add(1);
        if next >= item.max_retries {
            item.retry_count = next.min(item.max_retries);
            item.state = ItemState::Failed;
            item.next_attempt_at = None;
            return RetryDecision::Exhausted;
        }

        let delay_ms = self.backoff.delay_ms(next);
        item.retry_count = next;
        item.state = ItemState::Retrying;
        item.next_attempt_at =
            Some(now_ms.saturating_add(i64::try_from(delay_ms).unwrap_or(i64::MAX)));
        RetryDecision::Scheduled { delay_ms }
    }

    /// Attempt one item. `default` applies unless the item overrides it.
    pub async fn process(
        &self,
        item: &SyncQueueItem,
        default: ConflictResolution,
    ) -> ItemOutcome {
        let strategy = item.resolution.unwrap_or(default);
        let entity_id = item.entity_id();
        tracing::debug!(
            "Syncing {} {}/{} (attempt {})",
            item.op,
            item.table,
            entity_id,
            item.retry_count + 1
        );

        match item.op {
            OperationType::Create => self.process_create(item, &entity_id, strategy).await,
            OperationType::Update | OperationType::Delete => {
                if strategy != ConflictResolution::ClientWins {
                    match self.call(self.remote.fetch(&item.table, &entity_id)).await {
                        Ok(Some(row)) if has_diverged(item, &row) => {
                            return self.resolve(item, &entity_id, strategy, row).await;
                        }
                        Ok(None) if item.op == OperationType::Delete => {
                            return ItemOutcome::Committed {
                                remote: None,
                                conflict: None,
                            };
                        }
                        Ok(_) => {}
                        Err(error) => return Self::failure(error),
                    }
                }
                self.overwrite(item, &entity_id, &item.data).await
            }
        }
    }

    async fn process_create(
        &self,
        item: &SyncQueueItem,
        entity_id: &str,
        strategy: ConflictResolution,
    ) -> ItemOutcome {
        match self.call(self.remote.create(&item.table, &item.data)).await {
            Ok(row) => ItemOutcome::Committed {
                remote: Some(row),
                conflict: None,
            },
            Err(RemoteError::Conflict { remote, message }) => {
                let row = match remote {
                    Some(row) => Some(row),
                    None => match self.call(self.remote.fetch(&item.table, entity_id)).await {
                        Ok(row) => row,
                        Err(error) => return Self::failure(error),
                    },
                };
                match row {
                    Some(row) => self.resolve(item, entity_id, strategy, row).await,
                    None => ItemOutcome::Failed {
                        kind: SyncErrorKind::Conflict,
                        message,
                    },
                }
            }
            Err(error) => Self::failure(error),
        }
    }

    async fn resolve(
        &self,
        item: &SyncQueueItem,
        entity_id: &str,
        strategy: ConflictResolution,
        remote: Value,
    ) -> ItemOutcome {
        let remote_updated_at = updated_at_millis(&remote);
        let mut conflict = SyncConflict {
            id: 0,
            table: item.table.clone(),
            entity_id: entity_id.to_string(),
            local_updated_at: item.timestamp,
            remote_updated_at,
            resolved_at: Some(self.clock.now_ms()),
            strategy,
            local: item.data.clone(),
            remote: remote.clone(),
            item_id: item.id.clone(),
            op: item.op,
        };
        tracing::info!(
            "Sync conflict on {}/{}; resolving with {}",
            item.table,
            entity_id,
            strategy
        );

        match strategy {
            ConflictResolution::ClientWins => {
                match self.overwrite(item, entity_id, &item.data).await {
                    ItemOutcome::Committed { remote, .. } => ItemOutcome::Committed {
                        remote,
                        conflict: Some(conflict),
                    },
                    other => other,
                }
            }
            ConflictResolution::ServerWins => ItemOutcome::ServerWins { remote, conflict },
            // A delete cannot be merged with newer remote edits; keep the row
            ConflictResolution::Merge if item.op == OperationType::Delete => {
                ItemOutcome::ServerWins { remote, conflict }
            }
            ConflictResolution::Merge => {
                let merged = merge_records(
                    item.base.as_ref(),
                    &item.data,
                    &remote,
                    item.timestamp,
                    remote_updated_at,
                );
                match self
                    .call(self.remote.update(&item.table, entity_id, &merged))
                    .await
                {
                    Ok(stored) => ItemOutcome::Committed {
                        remote: Some(stored),
                        conflict: Some(conflict),
                    },
                    Err(error) => Self::failure(error),
                }
            }
            ConflictResolution::Manual => {
                conflict.resolved_at = None;
                ItemOutcome::Parked { conflict }
            }
        }
    }

    /// Write `data` regardless of the remote state.
    async fn overwrite(&self, item: &SyncQueueItem, entity_id: &str, data: &Value) -> ItemOutcome {
        let result = match item.op {
            OperationType::Create | OperationType::Update => self
                .call(self.remote.update(&item.table, entity_id, data))
                .await
                .map(Some),
            OperationType::Delete => {
                match self.call(self.remote.delete(&item.table, entity_id)).await {
                    Ok(()) | Err(RemoteError::NotFound(_)) => Ok(None),
                    Err(error) => Err(error),
                }
            }
        };

        match result {
            Ok(remote) => ItemOutcome::Committed {
                remote,
                conflict: None,
            },
            Err(error) => Self::failure(error),
        }
    }

    /// Current remote row, bounded by the request timeout.
    pub async fn fetch_row(&self, table: &str, id: &str) -> RemoteResult<Option<Value>> {
        self.call(self.remote.fetch(table, id)).await
    }

    /// Rows changed since `since`, bounded by the request timeout.
    pub async fn fetch_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<i64>,
    ) -> RemoteResult<Vec<Value>> {
        self.call(self.remote.fetch_since(table, user_id, since))
            .await
    }

    /// Probe connectivity; a failed or timed out probe reads as offline.
    pub async fn probe(&self) -> NetworkStatus {
        match self.call(self.remote.probe()).await {
            Ok(status) => status,
            Err(error) => {
                tracing::debug!("Network probe failed: {error}");
                NetworkStatus::offline()
            }
        }
    }

    async fn call<T, F>(&self, request: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .unwrap_or_else(|_| {
                Err(RemoteError::Timeout(
                    u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            })
    }

    fn failure(error: RemoteError) -> ItemOutcome {
        match error {
            RemoteError::Unauthorized(message) => ItemOutcome::Unauthorized(message),
            error if error.is_transient() => ItemOutcome::Retry { error },
            error => ItemOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }
}
