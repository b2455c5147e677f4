//! Data models for StudyCollab

mod cache_entry;
mod canvas;
mod offline_state;
mod sync_conflict;
mod sync_item;

pub use cache_entry::{compute_checksum, CacheEntry, CacheStats};
pub use canvas::{
    canvas_channel, CanvasChange, CanvasElement, ChangeType, DrawingProperties, ElementKind,
    Position, ShapeKind, ShapeProperties, StickyProperties, TextProperties, CANVAS_CHANGE_EVENT,
};
pub use offline_state::{EffectiveConnection, NetworkStatus, OfflineState, SyncError, SyncErrorKind};
pub use sync_conflict::{ConflictChoice, ConflictResolution, SyncConflict};
pub use sync_item::{
    ItemState, OperationType, SyncPriority, SyncQueueItem, DEFAULT_MAX_RETRIES, SYNC_TABLES,
};
