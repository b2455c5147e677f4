//! Client configuration.
//!
//! Provides `CoreConfig`, the injected configuration for the cache store,
//! sync engine and remote store. Loaded from a JSON file and overridden from
//! the environment; resolved once at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::ConflictResolution;
use crate::sync::Backoff;
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "STUDYCOLLAB_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "STUDYCOLLAB_SUPABASE_ANON_KEY";
pub const ENV_SYNC_STRATEGY: &str = "STUDYCOLLAB_SYNC_STRATEGY";
pub const ENV_LOW_POWER: &str = "STUDYCOLLAB_LOW_POWER";

/// How the sync queue is drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStrategy {
    /// Drain every eligible item as soon as online
    Immediate,
    /// Drain at most `batch_size` items per run
    Batched,
    /// Drain only when explicitly requested
    Manual,
    /// Batch size adapted to the observed network
    #[default]
    Smart,
}

impl SyncStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Batched => "BATCHED",
            Self::Manual => "MANUAL",
            Self::Smart => "SMART",
        }
    }
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMMEDIATE" => Ok(Self::Immediate),
            "BATCHED" => Ok(Self::Batched),
            "MANUAL" => Ok(Self::Manual),
            "SMART" => Ok(Self::Smart),
            other => Err(format!("unknown sync strategy '{other}'")),
        }
    }
}

/// Cache sizing and staleness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub max_size: usize,
    /// TTL applied when `put` is called without one; `None` never expires
    pub default_ttl_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            default_ttl_ms: Some(24 * 60 * 60 * 1000),
        }
    }
}

/// Sync drain settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub strategy: SyncStrategy,
    pub conflict_resolution: ConflictResolution,
    /// Remote calls slower than this count as transient failures
    pub request_timeout_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::default(),
            conflict_resolution: ConflictResolution::default(),
            request_timeout_ms: 10_000,
        }
    }
}

impl SyncSettings {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Retry, backoff and batching budget for the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcePolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub batch_size: usize,
    /// Battery / low-bandwidth mode
    pub low_power: bool,
    /// Multiplier applied to the backoff base in low-power mode
    pub low_power_factor: f64,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::models::DEFAULT_MAX_RETRIES,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            batch_size: 10,
            low_power: false,
            low_power_factor: 0.5,
        }
    }
}

impl ResourcePolicy {
    /// Backoff schedule with the low-power factor applied.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn backoff(&self) -> Backoff {
        let base_ms = if self.low_power {
            (self.backoff_base_ms as f64 * self.low_power_factor).round() as u64
        } else {
            self.backoff_base_ms
        };
        Backoff::new(base_ms.max(1), self.backoff_max_ms.max(base_ms))
    }
}

/// Remote store endpoints; public values only, tokens come from the identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }
}

/// Top-level configuration injected into the offline store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub cache: CacheConfig,
    pub sync: SyncSettings,
    pub resource_policy: ResourcePolicy,
    pub remote: RemoteConfig,
}

impl CoreConfig {
    /// Parse and validate a JSON configuration payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validated()
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(payload) => Self::parse(&payload),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = normalize_text_option(lookup(ENV_SUPABASE_URL)) {
            self.remote.supabase_url = Some(url);
        }
        if let Some(key) = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)) {
            self.remote.supabase_anon_key = Some(key);
        }
        if let Some(strategy) = normalize_text_option(lookup(ENV_SYNC_STRATEGY)) {
            self.sync.strategy = strategy.parse().map_err(Error::Config)?;
        }
        if let Some(low_power) = normalize_text_option(lookup(ENV_LOW_POWER)) {
            self.resource_policy.low_power = matches!(
                low_power.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.cache.max_size == 0 {
            return Err(Error::Config("cache.max_size must be > 0".to_string()));
        }
        if self.resource_policy.batch_size == 0 {
            return Err(Error::Config(
                "resource_policy.batch_size must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.resource_policy.low_power_factor)
            || self.resource_policy.low_power_factor == 0.0
        {
            return Err(Error::Config(
                "resource_policy.low_power_factor must be in (0, 1]".to_string(),
            ));
        }

        self.remote.supabase_url = match normalize_text_option(self.remote.supabase_url.take()) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(_) => {
                return Err(Error::Config(
                    "remote.supabase_url must include http:// or https://".to_string(),
                ))
            }
            None => None,
        };
        self.remote.supabase_anon_key = normalize_text_option(self.remote.supabase_anon_key.take());
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_empty_object_uses_defaults() {
        let config = CoreConfig::parse("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.sync.strategy, SyncStrategy::Smart);
        assert_eq!(config.resource_policy.max_retries, 3);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = CoreConfig::parse(r#"{"cache": {"max_size": 10, "shards": 2}}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn parse_rejects_invalid_remote_url() {
        let error = CoreConfig::parse(r#"{"remote": {"supabase_url": "project.supabase.co"}}"#)
            .unwrap_err();
        assert!(error.to_string().contains("http://"));
    }

    #[test]
    fn parse_trims_remote_url() {
        let config = CoreConfig::parse(
            r#"{"remote": {"supabase_url": " https://project.supabase.co/ ", "supabase_anon_key": "anon"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.remote.supabase_url.as_deref(),
            Some("https://project.supabase.co")
        );
        assert!(config.remote.is_configured());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env = HashMap::from([
            (ENV_SUPABASE_URL, "https://env.supabase.co"),
            (ENV_SUPABASE_ANON_KEY, "env-anon"),
            (ENV_SYNC_STRATEGY, "batched"),
            (ENV_LOW_POWER, "on"),
        ]);
        let config = CoreConfig::default()
            .with_env_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(
            config.remote.supabase_url.as_deref(),
            Some("https://env.supabase.co")
        );
        assert_eq!(config.sync.strategy, SyncStrategy::Batched);
        assert!(config.resource_policy.low_power);
    }

    #[test]
    fn low_power_scales_backoff_base_down() {
        let policy = ResourcePolicy {
            low_power: true,
            ..ResourcePolicy::default()
        };
        assert_eq!(policy.backoff().base_ms(), 500);
        assert_eq!(ResourcePolicy::default().backoff().base_ms(), 1_000);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = CoreConfig::default();
        config.cache.max_size = 42;
        config.sync.conflict_resolution = ConflictResolution::Merge;
        config.save(&path).unwrap();

        let loaded = CoreConfig::load(&path).unwrap();
        assert_eq!(loaded.cache.max_size, 42);
        assert_eq!(loaded.sync.conflict_resolution, ConflictResolution::Merge);
    }
}
