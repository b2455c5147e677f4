//! In-memory cache of domain rows with TTL and LRU eviction.
//!
//! `CacheStore` holds no I/O; the offline store persists an entry built by
//! `prepare` before handing it to `insert`.

use std::collections::HashMap;

use serde_json::Value;

use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::models::{compute_checksum, CacheEntry, CacheStats};

/// Cache key for a domain row
pub fn cache_key(table: &str, id: &str) -> String {
    format!("{table}:{id}")
}

/// Result of a `put`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub entry: CacheEntry,
    /// Keys removed to stay within `max_size`
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    last_access: u64,
}

/// Key-value cache of `CacheEntry` records
#[derive(Debug)]
pub struct CacheStore {
    slots: HashMap<String, Slot>,
    max_size: usize,
    default_ttl_ms: Option<u64>,
    clock: SharedClock,
    tick: u64,
    stats: CacheStats,
}

impl CacheStore {
    pub fn new(config: &CacheConfig, clock: SharedClock) -> Self {
        Self {
            slots: HashMap::new(),
            max_size: config.max_size.max(1),
            default_ttl_ms: config.default_ttl_ms,
            clock,
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    /// Load persisted entries, oldest first. Counters are not touched.
    pub fn restore(&mut self, entries: impl IntoIterator<Item = CacheEntry>) {
        for entry in entries {
            let last_access = self.next_tick();
            self.slots.insert(entry.id.clone(), Slot { entry, last_access });
        }
    }

    /// Fetch a live entry.
    ///
    /// Expired and corrupted entries are removed and reported as
    /// `NotFound` / `Corruption`; both count as misses.
    pub fn get(&mut self, key: &str) -> Result<CacheEntry> {
        let now = self.clock.now_ms();
        let Some(slot) = self.slots.get(key) else {
            self.stats.misses += 1;
            return Err(Error::NotFound(key.to_string()));
        };

        if slot.entry.is_expired(now) {
            self.slots.remove(key);
            self.stats.misses += 1;
            tracing::debug!("Cache entry {key} expired");
            return Err(Error::NotFound(key.to_string()));
        }

        if !slot.entry.verify() {
            self.slots.remove(key);
            self.stats.misses += 1;
            self.stats.evictions += 1;
            tracing::warn!("Cache entry {key} failed checksum verification; evicted");
            return Err(Error::Corruption(key.to_string()));
        }

        let tick = self.next_tick();
        let Some(slot) = self.slots.get_mut(key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        slot.last_access = tick;
        self.stats.hits += 1;
        Ok(slot.entry.clone())
    }

    /// Entry without touching counters, recency or expiry.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.slots.get(key).map(|slot| &slot.entry)
    }

    /// Store `data` under `key`.
    ///
    /// `ttl_ms` falls back to the configured default. The version continues
    /// from any prior entry for the key.
    pub fn put(&mut self, key: &str, data: Value, ttl_ms: Option<u64>, dirty: bool) -> CacheWrite {
        let entry = self.prepare(key, data, ttl_ms, dirty);
        let evicted = self.insert(entry.clone());
        CacheWrite { entry, evicted }
    }

    /// Build the entry `put` would store, without storing it.
    pub fn prepare(&self, key: &str, data: Value, ttl_ms: Option<u64>, dirty: bool) -> CacheEntry {
        let now = self.clock.now_ms();
        let expires_at = ttl_ms
            .or(self.default_ttl_ms)
            .map(|ttl| now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX)));
        let version = self
            .slots
            .get(key)
            .map_or(1, |slot| slot.entry.version + 1);

        CacheEntry {
            id: key.to_string(),
            checksum: compute_checksum(&data),
            data,
            timestamp: now,
            expires_at,
            version,
            encrypted: false,
            dirty,
        }
    }

    /// Store a prepared entry. Returns the keys evicted to stay within
    /// `max_size`.
    pub fn insert(&mut self, entry: CacheEntry) -> Vec<String> {
        let key = entry.id.clone();
        let last_access = self.next_tick();
        self.slots.insert(key.clone(), Slot { entry, last_access });
        self.evict_over_capacity(&key)
    }

    /// Remove `key` unconditionally. Returns whether an entry was present.
    pub fn evict(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Clear the dirty marker once the remote store confirmed the write.
    pub fn mark_clean(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.slots.get_mut(key)?;
        if !slot.entry.dirty {
            return None;
        }
        slot.entry.dirty = false;
        Some(slot.entry.clone())
    }

    /// Purge every expired entry and stamp `last_cleanup`.
    pub fn cleanup(&mut self) -> Vec<String> {
        let now = self.clock.now_ms();
        let expired: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.slots.remove(key);
        }
        self.stats.last_cleanup = Some(now);
        if !expired.is_empty() {
            tracing::debug!("Cache cleanup removed {} expired entries", expired.len());
        }
        expired
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.slots.len();
        stats.total_size = self.slots.values().map(|slot| slot.entry.size_bytes()).sum();
        stats.refresh_rates();
        stats
    }

    /// Keys of entries with unconfirmed local writes.
    pub fn dirty_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.dirty)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Every live entry, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.slots.values().map(|slot| &slot.entry)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Dirty entries are pinned until confirmed; when only those remain the
    /// cache is allowed to exceed `max_size`.
    fn evict_over_capacity(&mut self, keep: &str) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.slots.len() > self.max_size {
            let victim = self
                .slots
                .iter()
                .filter(|(key, slot)| key.as_str() != keep && !slot.entry.dirty)
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(key, _)| key.clone());
            let Some(victim) = victim else {
                tracing::warn!(
                    "Cache holds {} entries over its limit of {}; unsynced entries are kept",
                    self.slots.len(),
                    self.max_size
                );
                break;
            };
            self.slots.remove(&victim);
            self.stats.evictions += 1;
            tracing::debug!("Evicted least recently used cache entry {victim}");
            evicted.push(victim);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn store(max_size: usize) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = CacheConfig {
            max_size,
            default_ttl_ms: None,
        };
        (CacheStore::new(&config, clock.clone()), clock)
    }

    #[test]
    fn get_returns_entry_until_ttl_passes() {
        let (mut cache, clock) = store(10);
        cache.put("task-1", json!({"title": "A"}), Some(1_000), false);

        let entry = cache.get("task-1").unwrap();
        assert_eq!(entry.data, json!({"title": "A"}));
        assert_eq!(entry.version, 1);

        clock.advance(1_001);
        let error = cache.get("task-1").unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert!(cache.peek("task-1").is_none());
    }

    #[test]
    fn entry_is_still_live_at_exact_expiry() {
        let (mut cache, clock) = store(10);
        cache.put("k", json!(1), Some(500), false);
        clock.advance(500);
        assert!(cache.get("k").is_ok());
    }

    #[test]
    fn every_put_bumps_version_by_one() {
        let (mut cache, _clock) = store(10);
        for (round, title) in ["A", "B", "C"].into_iter().enumerate() {
            let write = cache.put("tasks:t1", json!({"title": title}), None, false);
            assert_eq!(write.entry.version, round as u64 + 1);
        }
        let entry = cache.get("tasks:t1").unwrap();
        assert_eq!(entry.data, json!({"title": "C"}));
        assert_eq!(entry.version, 3);
    }

    #[test]
    fn version_restarts_after_evict() {
        let (mut cache, _clock) = store(10);
        cache.put("k", json!(1), None, false);
        cache.put("k", json!(2), None, false);
        assert!(cache.evict("k"));
        assert!(!cache.evict("k"));
        assert_eq!(cache.put("k", json!(3), None, false).entry.version, 1);
    }

    #[test]
    fn put_evicts_least_recently_used() {
        let (mut cache, _clock) = store(2);
        cache.put("a", json!(1), None, false);
        cache.put("b", json!(2), None, false);
        cache.get("a").unwrap();

        let write = cache.put("c", json!(3), None, false);
        assert_eq!(write.evicted, vec!["b".to_string()]);
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn dirty_entries_are_never_evicted() {
        let (mut cache, _clock) = store(2);
        cache.put("tasks:t1", json!({"title": "mine"}), None, true);
        cache.put("b", json!(2), None, false);

        let write = cache.put("c", json!(3), None, false);
        assert_eq!(write.evicted, vec!["b".to_string()]);
        assert!(cache.peek("tasks:t1").is_some());

        let write = cache.put("tasks:t2", json!({"title": "also mine"}), None, true);
        assert_eq!(write.evicted, vec!["c".to_string()]);

        // Only pinned entries left besides the new one: go over capacity
        let write = cache.put("d", json!(4), None, false);
        assert!(write.evicted.is_empty());
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.dirty_keys(),
            vec!["tasks:t1".to_string(), "tasks:t2".to_string()]
        );

        cache.mark_clean("tasks:t1");
        let write = cache.put("e", json!(5), None, false);
        assert_eq!(write.evicted, vec!["tasks:t1".to_string(), "d".to_string()]);
    }

    #[test]
    fn corrupted_entry_is_evicted_not_served() {
        let (mut cache, _clock) = store(10);
        let mut entry = CacheEntry::new("tasks:t1", json!({"title": "A"}), 0, None);
        entry.data = json!({"title": "tampered"});
        cache.restore([entry]);

        let error = cache.get("tasks:t1").unwrap_err();
        assert!(matches!(error, Error::Corruption(_)));
        assert!(error.is_cache_miss());
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_track_hits_misses_and_size() {
        let (mut cache, _clock) = store(10);
        cache.put("a", json!({"x": 1}), None, false);
        cache.get("a").unwrap();
        cache.get("a").unwrap();
        cache.get("missing").unwrap_err();

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_size, json!({"x": 1}).to_string().len());
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn default_ttl_applies_when_none_given() {
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            max_size: 10,
            default_ttl_ms: Some(100),
        };
        let mut cache = CacheStore::new(&config, clock.clone());
        let write = cache.put("k", json!(1), None, false);
        assert_eq!(write.entry.expires_at, Some(100));
        assert_eq!(cache.put("j", json!(1), Some(5), false).entry.expires_at, Some(5));
    }

    #[test]
    fn cleanup_removes_expired_and_stamps_time() {
        let (mut cache, clock) = store(10);
        cache.put("short", json!(1), Some(10), false);
        cache.put("long", json!(2), Some(10_000), false);
        clock.advance(11);

        assert_eq!(cache.cleanup(), vec!["short".to_string()]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().last_cleanup, Some(1_011));
    }

    #[test]
    fn mark_clean_clears_dirty_once() {
        let (mut cache, _clock) = store(10);
        cache.put("tasks:t1", json!({"id": "t1"}), None, true);
        assert_eq!(cache.dirty_keys(), vec!["tasks:t1".to_string()]);

        assert!(cache.mark_clean("tasks:t1").is_some());
        assert!(cache.mark_clean("tasks:t1").is_none());
        assert!(cache.dirty_keys().is_empty());
    }

    #[test]
    fn cache_key_joins_table_and_id() {
        assert_eq!(cache_key("tasks", "t1"), "tasks:t1");
    }
}
