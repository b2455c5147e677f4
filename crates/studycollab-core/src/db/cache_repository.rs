//! Cache entry persistence

use crate::error::Result;
use crate::models::CacheEntry;
use libsql::Connection;

use super::values::{
    flag, int, json, opt_int, params, read_flag, read_i64, read_json, read_opt_i64, read_text,
    read_u64, text, unsigned,
};

/// Trait for cache entry storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CacheRepository {
    /// Insert or replace an entry
    async fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry; missing keys are ignored
    async fn delete(&self, id: &str) -> Result<()>;

    /// Load every stored entry, oldest write first
    async fn load_all(&self) -> Result<Vec<CacheEntry>>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `CacheRepository`
pub struct LibSqlCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<CacheEntry> {
        Ok(CacheEntry {
            id: read_text(row, 0)?,
            data: read_json(row, 1)?,
            timestamp: read_i64(row, 2)?,
            expires_at: read_opt_i64(row, 3)?,
            version: read_u64(row, 4)?,
            checksum: read_text(row, 5)?,
            encrypted: read_flag(row, 6)?,
            dirty: read_flag(row, 7)?,
        })
    }
}

impl CacheRepository for LibSqlCacheRepository<'_> {
    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO cache_entries
                    (id, data, timestamp, expires_at, version, checksum, encrypted, dirty)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params(vec![
                    text(entry.id.as_str()),
                    json(&entry.data),
                    int(entry.timestamp),
                    opt_int(entry.expires_at),
                    unsigned(entry.version),
                    text(entry.checksum.as_str()),
                    flag(entry.encrypted),
                    flag(entry.dirty),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE id = ?1", [id])
            .await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<CacheEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, data, timestamp, expires_at, version, checksum, encrypted, dirty
                 FROM cache_entries
                 ORDER BY timestamp ASC, id ASC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM cache_entries", ()).await?;
        Ok(())
    }
}
