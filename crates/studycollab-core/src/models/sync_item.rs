//! Sync queue item model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ConflictResolution;
use crate::util::record_id;

/// Remote tables the queue may target
pub const SYNC_TABLES: &[&str] = &[
    "notes",
    "tasks",
    "files",
    "study_groups",
    "resources",
    "bookmarks",
];

/// Default retry budget for a queue item
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Kind of mutation recorded in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown operation type '{other}'")),
        }
    }
}

/// Priority band; lower rank drains first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl SyncPriority {
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl FromStr for SyncPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Lifecycle of a queue item.
///
/// `Pending -> InFlight -> {Committed | Retrying -> Pending | Failed}`.
/// Only `Pending` and `Retrying` are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Pending,
    InFlight,
    Retrying,
    Committed,
    Failed,
}

impl ItemState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Retrying => "retrying",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    /// State to persist; `InFlight` survives a restart as `Pending`.
    pub const fn durable(self) -> Self {
        match self {
            Self::Retrying => Self::Retrying,
            _ => Self::Pending,
        }
    }
}

impl FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "retrying" => Ok(Self::Retrying),
            "committed" => Ok(Self::Committed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown item state '{other}'")),
        }
    }
}

/// One pending mutation against the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Queue item identifier (UUID v7)
    pub id: String,
    #[serde(rename = "type")]
    pub op: OperationType,
    /// Remote table name
    pub table: String,
    /// Row payload (full row for CREATE, changed fields for UPDATE)
    pub data: Value,
    /// Client-generated id for rows not yet created remotely
    pub local_id: Option<String>,
    /// Enqueue timestamp (Unix ms)
    pub timestamp: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: SyncPriority,
    pub state: ItemState,
    /// Earliest time the next attempt may run (Unix ms)
    pub next_attempt_at: Option<i64>,
    /// Cached value before the local change, used for field-level merges
    pub base: Option<Value>,
    /// Overrides the drain's conflict policy for this item
    pub resolution: Option<ConflictResolution>,
}

impl SyncQueueItem {
    /// Create a pending item with default priority and retry budget.
    pub fn new(op: OperationType, table: impl Into<String>, data: Value, timestamp: i64) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            op,
            table: table.into(),
            data,
            local_id: None,
            timestamp,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            priority: SyncPriority::default(),
            state: ItemState::Pending,
            next_attempt_at: None,
            base: None,
            resolution: None,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: SyncPriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base(mut self, base: Option<Value>) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub const fn with_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Row identifier: `data.id`, then `local_id`, then the item id.
    pub fn entity_id(&self) -> String {
        record_id(&self.data)
            .or_else(|| self.local_id.clone())
            .unwrap_or_else(|| self.id.clone())
    }

    /// Ordering key; items sharing it are applied in enqueue order.
    pub fn entity_key(&self) -> String {
        format!("{}:{}", self.table, self.entity_id())
    }

    /// Whether the item may be attempted at `now_ms`.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now_ms)
    }

    /// Whether `table` is a known remote table.
    pub fn is_known_table(table: &str) -> bool {
        SYNC_TABLES.contains(&table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_item_defaults() {
        let item = SyncQueueItem::new(OperationType::Create, "tasks", json!({"id": "t1"}), 5);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(item.priority, SyncPriority::Medium);
        assert_eq!(item.state, ItemState::Pending);
        assert!(item.is_due(0));
    }

    #[test]
    fn test_entity_id_fallbacks() {
        let with_data_id = SyncQueueItem::new(OperationType::Update, "tasks", json!({"id": "t1"}), 0)
            .with_local_id("local-1");
        assert_eq!(with_data_id.entity_key(), "tasks:t1");

        let with_local =
            SyncQueueItem::new(OperationType::Create, "notes", json!({"title": "x"}), 0)
                .with_local_id("local-1");
        assert_eq!(with_local.entity_key(), "notes:local-1");

        let bare = SyncQueueItem::new(OperationType::Create, "notes", json!({}), 0);
        assert_eq!(bare.entity_id(), bare.id);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(SyncPriority::High.rank() < SyncPriority::Medium.rank());
        assert!(SyncPriority::Medium.rank() < SyncPriority::Low.rank());
    }

    #[test]
    fn test_enum_string_roundtrip() {
        for op in [OperationType::Create, OperationType::Update, OperationType::Delete] {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
        assert_eq!("low".parse::<SyncPriority>().unwrap(), SyncPriority::Low);
        assert!("urgent".parse::<SyncPriority>().is_err());
        assert_eq!(ItemState::InFlight.durable(), ItemState::Pending);
        assert_eq!(ItemState::Retrying.durable(), ItemState::Retrying);
    }

    #[test]
    fn test_serializes_type_field() {
        let item = SyncQueueItem::new(OperationType::Delete, "files", json!({"id": "f1"}), 0);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "DELETE");
        assert_eq!(value["priority"], "MEDIUM");
    }

    #[test]
    fn test_known_tables() {
        assert!(SyncQueueItem::is_known_table("study_groups"));
        assert!(!SyncQueueItem::is_known_table("users"));
    }
}
