//! Sync queue, error list and conflict log persistence

use crate::error::Result;
use crate::models::{ConflictResolution, SyncConflict, SyncError, SyncQueueItem};
use libsql::{Connection, Row};

use super::values::{
    int, json, opt_int, opt_json, opt_text, params, read_enum, read_i64, read_json,
    read_opt_i64, read_opt_json, read_opt_text, read_text, read_u32, text, unsigned,
};

/// Durable queue storage (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueueRepository {
    /// Insert a new item at the tail, or update an existing one in place
    async fn upsert_item(&self, item: &SyncQueueItem) -> Result<()>;

    /// Remove an item; missing ids are ignored
    async fn delete_item(&self, id: &str) -> Result<()>;

    /// Load every queued item in enqueue order
    async fn load_items(&self) -> Result<Vec<SyncQueueItem>>;
}

/// Dead-letter storage (async)
#[allow(async_fn_in_trait)]
pub trait SyncErrorRepository {
    /// Record an error; a second error for the same item replaces the first
    async fn insert_error(&self, error: &SyncError) -> Result<()>;

    async fn delete_error(&self, id: &str) -> Result<()>;

    /// All recorded errors, oldest first
    async fn list_errors(&self) -> Result<Vec<SyncError>>;
}

/// Conflict log storage (async)
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    /// Append a conflict and return its row id; `conflict.id` is ignored
    async fn record_conflict(&self, conflict: &SyncConflict) -> Result<i64>;

    async fn get_conflict(&self, id: i64) -> Result<Option<SyncConflict>>;

    /// Conflicts newest first, optionally only those awaiting the user
    async fn list_conflicts(&self, pending_only: bool, limit: usize) -> Result<Vec<SyncConflict>>;

    /// Stamp a conflict as resolved with the strategy that settled it
    async fn mark_conflict_resolved(
        &self,
        id: i64,
        strategy: ConflictResolution,
        resolved_at: i64,
    ) -> Result<()>;
}

/// libSQL implementation of the sync repositories
pub struct LibSqlSyncRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_item(row: &Row) -> Result<SyncQueueItem> {
        Ok(SyncQueueItem {
            id: read_text(row, 0)?,
            op: read_enum(row, 1)?,
            table: read_text(row, 2)?,
            data: read_json(row, 3)?,
            local_id: read_opt_text(row, 4)?,
            timestamp: read_i64(row, 5)?,
            retry_count: read_u32(row, 6)?,
            max_retries: read_u32(row, 7)?,
            priority: read_enum(row, 8)?,
            state: read_enum(row, 9)?,
            next_attempt_at: read_opt_i64(row, 10)?,
            base: read_opt_json(row, 11)?,
            resolution: read_opt_text(row, 12)?
                .map(|value| value.parse())
                .transpose()
                .map_err(crate::Error::Database)?,
        })
    }

    fn parse_error(row: &Row) -> Result<SyncError> {
        let item: SyncQueueItem = serde_json::from_str(&read_text(row, 6)?)?;
        Ok(SyncError {
            id: read_text(row, 0)?,
            item_id: read_text(row, 1)?,
            kind: read_enum(row, 2)?,
            message: read_text(row, 3)?,
            table: read_text(row, 4)?,
            timestamp: read_i64(row, 5)?,
            item,
        })
    }

    fn parse_conflict(row: &Row) -> Result<SyncConflict> {
        Ok(SyncConflict {
            id: read_i64(row, 0)?,
            table: read_text(row, 1)?,
            entity_id: read_text(row, 2)?,
            local_updated_at: read_i64(row, 3)?,
            remote_updated_at: read_opt_i64(row, 4)?,
            resolved_at: read_opt_i64(row, 5)?,
            strategy: read_enum(row, 6)?,
            local: read_json(row, 7)?,
            remote: read_json(row, 8)?,
            item_id: read_text(row, 9)?,
            op: read_enum(row, 10)?,
        })
    }
}

impl SyncQueueRepository for LibSqlSyncRepository<'_> {
    async fn upsert_item(&self, item: &SyncQueueItem) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_queue (
                    id, op, table_name, data, local_id, timestamp, retry_count,
                    max_retries, priority, state, next_attempt_at, base, resolution
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    retry_count = excluded.retry_count,
                    max_retries = excluded.max_retries,
                    priority = excluded.priority,
                    state = excluded.state,
                    next_attempt_at = excluded.next_attempt_at,
                    base = excluded.base,
                    resolution = excluded.resolution",
                params(vec![
                    text(item.id.as_str()),
                    text(item.op.as_str()),
                    text(item.table.as_str()),
                    json(&item.data),
                    opt_text(item.local_id.as_deref()),
                    int(item.timestamp),
                    unsigned(item.retry_count),
                    unsigned(item.max_retries),
                    text(item.priority.as_str()),
                    text(item.state.durable().as_str()),
                    opt_int(item.next_attempt_at),
                    opt_json(item.base.as_ref()),
                    opt_text(item.resolution.map(ConflictResolution::as_str)),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_queue WHERE id = ?1", [id])
            .await?;
        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<SyncQueueItem>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, op, table_name, data, local_id, timestamp, retry_count,
                        max_retries, priority, state, next_attempt_at, base, resolution
                 FROM sync_queue
                 ORDER BY seq ASC",
                (),
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }
}

impl SyncErrorRepository for LibSqlSyncRepository<'_> {
    async fn insert_error(&self, error: &SyncError) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_errors
                    (id, item_id, kind, message, table_name, timestamp, item)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params(vec![
                    text(error.id.as_str()),
                    text(error.item_id.as_str()),
                    text(error.kind.as_str()),
                    text(error.message.as_str()),
                    text(error.table.as_str()),
                    int(error.timestamp),
                    text(serde_json::to_string(&error.item)?),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn delete_error(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_errors WHERE id = ?1", [id])
            .await?;
        Ok(())
    }

    async fn list_errors(&self) -> Result<Vec<SyncError>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, item_id, kind, message, table_name, timestamp, item
                 FROM sync_errors
                 ORDER BY timestamp ASC, id ASC",
                (),
            )
            .await?;

        let mut errors = Vec::new();
        while let Some(row) = rows.next().await? {
            errors.push(Self::parse_error(&row)?);
        }
        Ok(errors)
    }
}

impl ConflictRepository for LibSqlSyncRepository<'_> {
    async fn record_conflict(&self, conflict: &SyncConflict) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    table_name, entity_id, local_updated_at, remote_updated_at,
                    resolved_at, strategy, local, remote, item_id, op
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params(vec![
                    text(conflict.table.as_str()),
                    text(conflict.entity_id.as_str()),
                    int(conflict.local_updated_at),
                    opt_int(conflict.remote_updated_at),
                    opt_int(conflict.resolved_at),
                    text(conflict.strategy.as_str()),
                    json(&conflict.local),
                    json(&conflict.remote),
                    text(conflict.item_id.as_str()),
                    text(conflict.op.as_str()),
                ]),
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn get_conflict(&self, id: i64) -> Result<Option<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, table_name, entity_id, local_updated_at, remote_updated_at,
                        resolved_at, strategy, local, remote, item_id, op
                 FROM sync_conflicts
                 WHERE id = ?1",
                params(vec![int(id)]),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_conflict(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_conflicts(&self, pending_only: bool, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = if pending_only {
            "SELECT id, table_name, entity_id, local_updated_at, remote_updated_at,
                    resolved_at, strategy, local, remote, item_id, op
             FROM sync_conflicts
             WHERE resolved_at IS NULL
             ORDER BY id DESC
             LIMIT ?1"
        } else {
            "SELECT id, table_name, entity_id, local_updated_at, remote_updated_at,
                    resolved_at, strategy, local, remote, item_id, op
             FROM sync_conflicts
             ORDER BY id DESC
             LIMIT ?1"
        };
        let mut rows = self.conn.query(sql, params(vec![int(limit)])).await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }

    async fn mark_conflict_resolved(
        &self,
        id: i64,
        strategy: ConflictResolution,
        resolved_at: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_conflicts SET resolved_at = ?1, strategy = ?2 WHERE id = ?3",
                params(vec![int(resolved_at), text(strategy.as_str()), int(id)]),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ItemState, OperationType, SyncErrorKind, SyncPriority};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn conflict(entity_id: &str, resolved_at: Option<i64>) -> SyncConflict {
        SyncConflict {
            id: 0,
            table: "tasks".to_string(),
            entity_id: entity_id.to_string(),
            local_updated_at: 100,
            remote_updated_at: Some(200),
            resolved_at,
            strategy: ConflictResolution::Manual,
            local: json!({"title": "local"}),
            remote: json!({"title": "remote"}),
            item_id: "item-1".to_string(),
            op: OperationType::Update,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_roundtrip_preserves_order() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        let first = SyncQueueItem::new(OperationType::Create, "tasks", json!({"id": "t1"}), 1)
            .with_priority(SyncPriority::Low)
            .with_local_id("local-t1");
        let second = SyncQueueItem::new(OperationType::Update, "notes", json!({"id": "n1"}), 2)
            .with_base(Some(json!({"id": "n1", "title": "old"})))
            .with_resolution(ConflictResolution::Merge);
        repo.upsert_item(&first).await.unwrap();
        repo.upsert_item(&second).await.unwrap();

        let loaded = repo.load_items().await.unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_update_keeps_position_and_persists_durable_state() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        let mut first = SyncQueueItem::new(OperationType::Update, "tasks", json!({"id": "t1"}), 1);
        let second = SyncQueueItem::new(OperationType::Update, "tasks", json!({"id": "t2"}), 2);
        repo.upsert_item(&first).await.unwrap();
        repo.upsert_item(&second).await.unwrap();

        first.retry_count = 2;
        first.state = ItemState::InFlight;
        first.next_attempt_at = Some(5_000);
        repo.upsert_item(&first).await.unwrap();

        let loaded = repo.load_items().await.unwrap();
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[0].retry_count, 2);
        assert_eq!(loaded[0].state, ItemState::Pending);
        assert_eq!(loaded[0].next_attempt_at, Some(5_000));
        assert_eq!(loaded[1].id, second.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_delete() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        let item = SyncQueueItem::new(OperationType::Delete, "files", json!({"id": "f1"}), 1);
        repo.upsert_item(&item).await.unwrap();
        repo.delete_item(&item.id).await.unwrap();
        repo.delete_item(&item.id).await.unwrap();

        assert!(repo.load_items().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_errors_keep_failed_item() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        let item = SyncQueueItem::new(OperationType::Create, "tasks", json!({"id": "t1"}), 1);
        let error = SyncError::new(item.clone(), SyncErrorKind::Validation, "bad title", 10);
        repo.insert_error(&error).await.unwrap();

        let loaded = repo.list_errors().await.unwrap();
        assert_eq!(loaded, vec![error.clone()]);
        assert_eq!(loaded[0].item, item);

        repo.delete_error(&error.id).await.unwrap();
        assert!(repo.list_errors().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_error_for_same_item_replaces_first() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        let item = SyncQueueItem::new(OperationType::Create, "tasks", json!({"id": "t1"}), 1);
        repo.insert_error(&SyncError::new(item.clone(), SyncErrorKind::Network, "a", 10))
            .await
            .unwrap();
        repo.insert_error(&SyncError::new(item, SyncErrorKind::Network, "b", 20))
            .await
            .unwrap();

        let loaded = repo.list_errors().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].message, "b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_log_lifecycle() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        let parked = repo.record_conflict(&conflict("t1", None)).await.unwrap();
        let settled = repo.record_conflict(&conflict("t2", Some(300))).await.unwrap();
        assert!(settled > parked);

        let pending = repo.list_conflicts(true, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, parked);
        assert!(pending[0].is_pending());

        let all = repo.list_conflicts(false, 10).await.unwrap();
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![settled, parked]);

        repo.mark_conflict_resolved(parked, ConflictResolution::ClientWins, 400)
            .await
            .unwrap();
        let resolved = repo.get_conflict(parked).await.unwrap().unwrap();
        assert_eq!(resolved.resolved_at, Some(400));
        assert_eq!(resolved.strategy, ConflictResolution::ClientWins);
        assert!(repo.list_conflicts(true, 10).await.unwrap().is_empty());
        assert!(repo.get_conflict(9_999).await.unwrap().is_none());
    }
}
