//! Database layer for the offline store

mod cache_repository;
mod connection;
mod migrations;
mod sync_repository;
mod values;

pub use cache_repository::{CacheRepository, LibSqlCacheRepository};
pub use connection::Database;
pub use migrations::CURRENT_VERSION;
pub use sync_repository::{
    ConflictRepository, LibSqlSyncRepository, SyncErrorRepository, SyncQueueRepository,
};
