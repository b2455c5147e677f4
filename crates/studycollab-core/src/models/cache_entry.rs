//! Cache entry model

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A locally stored copy of a remote domain object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key (`{table}:{id}` for domain rows)
    pub id: String,
    /// Cached payload
    pub data: Value,
    /// Last write timestamp (Unix ms)
    pub timestamp: i64,
    /// Expiry timestamp (Unix ms); never expires when `None`
    pub expires_at: Option<i64>,
    /// Incremented on every write for the same key
    pub version: u64,
    /// SHA-256 of the serialized payload, hex encoded
    pub checksum: String,
    /// Whether the payload was stored encrypted
    pub encrypted: bool,
    /// Optimistic write not yet confirmed by the remote store
    pub dirty: bool,
}

impl CacheEntry {
    /// Build a fresh entry, computing its checksum.
    pub fn new(
        id: impl Into<String>,
        data: Value,
        timestamp: i64,
        expires_at: Option<i64>,
    ) -> Self {
        let checksum = compute_checksum(&data);
        Self {
            id: id.into(),
            data,
            timestamp,
            expires_at,
            version: 1,
            checksum,
            encrypted: false,
            dirty: false,
        }
    }

    /// `now > expires_at`
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| now_ms > expires_at)
    }

    /// Whether the stored checksum still matches the payload.
    pub fn verify(&self) -> bool {
        self.checksum == compute_checksum(&self.data)
    }

    /// Serialized payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.to_string().len()
    }

    /// Decode the payload into a typed domain object.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.data.clone())
    }
}

/// Checksum used for corruption detection (not integrity against tampering).
pub fn compute_checksum(data: &Value) -> String {
    hex::encode(Sha256::digest(data.to_string().as_bytes()))
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    /// Sum of serialized payload sizes in bytes
    pub total_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub evictions: u64,
    /// Last full expiry sweep (Unix ms)
    pub last_cleanup: Option<i64>,
}

impl CacheStats {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn refresh_rates(&mut self) {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            self.hit_rate = 0.0;
            self.miss_rate = 0.0;
        } else {
            self.hit_rate = self.hits as f64 / lookups as f64;
            self.miss_rate = self.misses as f64 / lookups as f64;
        }
    }
}
