//! Offline state, sync errors and network status

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SyncQueueItem;

/// Classification of a failed sync item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncErrorKind {
    Network,
    Conflict,
    Validation,
    Unknown,
}

impl SyncErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Conflict => "CONFLICT",
            Self::Validation => "VALIDATION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for SyncErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NETWORK" => Ok(Self::Network),
            "CONFLICT" => Ok(Self::Conflict),
            "VALIDATION" => Ok(Self::Validation),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown sync error kind '{other}'")),
        }
    }
}

/// A queue item removed from automatic retry and surfaced to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    pub id: String,
    pub item_id: String,
    pub kind: SyncErrorKind,
    pub message: String,
    pub table: String,
    /// When the error was recorded (Unix ms)
    pub timestamp: i64,
    /// The failed item, kept so it can be retried or dismissed
    pub item: SyncQueueItem,
}

impl SyncError {
    pub fn new(
        item: SyncQueueItem,
        kind: SyncErrorKind,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            item_id: item.id.clone(),
            kind,
            message: message.into(),
            table: item.table.clone(),
            timestamp,
            item,
        }
    }
}

/// Effective connection class reported by a network probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectiveConnection {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    #[default]
    FourG,
}

/// Result of a connectivity probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub online: bool,
    pub effective_type: EffectiveConnection,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u64>,
    /// User or platform asked to conserve data/battery
    pub save_data: bool,
}

impl NetworkStatus {
    /// Round trips slower than this count as a degraded link.
    pub const HIGH_RTT_MS: u64 = 600;

    pub const fn online() -> Self {
        Self {
            online: true,
            effective_type: EffectiveConnection::FourG,
            downlink_mbps: None,
            rtt_ms: None,
            save_data: false,
        }
    }

    pub const fn offline() -> Self {
        Self {
            online: false,
            effective_type: EffectiveConnection::Slow2g,
            downlink_mbps: None,
            rtt_ms: None,
            save_data: false,
        }
    }

    /// Batch size for adaptive draining given a base batch size.
    ///
    /// Slow links or data saving drain a quarter of the base, 3G or high
    /// latency half, anything else the full base. Offline drains nothing.
    pub fn adapted_batch_size(&self, base: usize) -> usize {
        if !self.online {
            return 0;
        }
        let base = base.max(1);
        let degraded = matches!(
            self.effective_type,
            EffectiveConnection::Slow2g | EffectiveConnection::TwoG
        ) || self.save_data
            || self.downlink_mbps.is_some_and(|mbps| mbps < 0.5);
        if degraded {
            return (base / 4).max(1);
        }
        let slow = self.effective_type == EffectiveConnection::ThreeG
            || self.rtt_ms.is_some_and(|rtt| rtt > Self::HIGH_RTT_MS);
        if slow {
            (base / 2).max(1)
        } else {
            base
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::online()
    }
}

/// Process-wide offline state derived from the queue and network probes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineState {
    pub is_online: bool,
    pub is_offline_mode: bool,
    /// Last completed drain or pull (Unix ms)
    pub last_sync_time: Option<i64>,
    pub sync_in_progress: bool,
    /// Always equals the live queue length
    pub pending_changes: usize,
    pub cache_size: usize,
    pub sync_errors: Vec<SyncError>,
}
