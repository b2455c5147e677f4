//! Sync conflict model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::OperationType;

/// Policy applied when the remote row diverged from a queued change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    /// Local data overwrites remote
    ClientWins,
    /// Discard local change and accept remote state
    #[default]
    ServerWins,
    /// Field-level merge, newer `updated_at` wins on fields touched by both
    Merge,
    /// Park the conflict for the user to decide
    Manual,
}

impl ConflictResolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientWins => "CLIENT_WINS",
            Self::ServerWins => "SERVER_WINS",
            Self::Merge => "MERGE",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CLIENT_WINS" => Ok(Self::ClientWins),
            "SERVER_WINS" => Ok(Self::ServerWins),
            "MERGE" => Ok(Self::Merge),
            "MANUAL" => Ok(Self::Manual),
            other => Err(format!("unknown conflict resolution '{other}'")),
        }
    }
}

/// Recorded sync conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Remote table
    pub table: String,
    /// Row involved in the conflict
    pub entity_id: String,
    /// Local change timestamp (unix ms)
    pub local_updated_at: i64,
    /// Remote row's `updated_at` when the conflict was detected
    pub remote_updated_at: Option<i64>,
    /// Resolution timestamp (unix ms); `None` while awaiting the user
    pub resolved_at: Option<i64>,
    /// Strategy that handled (or will handle) the conflict
    pub strategy: ConflictResolution,
    /// Local payload
    pub local: Value,
    /// Remote payload
    pub remote: Value,
    /// Queue item that triggered the conflict, kept for manual resolution
    pub item_id: String,
    /// Operation of that queue item
    pub op: OperationType,
}

impl SyncConflict {
    pub const fn is_pending(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// User decision for a parked conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    KeepLocal,
    KeepRemote,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse_accepts_dashes() {
        assert_eq!(
            "client-wins".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::ClientWins
        );
        assert_eq!(
            "SERVER_WINS".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::ServerWins
        );
        assert!("newest".parse::<ConflictResolution>().is_err());
    }

    #[test]
    fn test_resolution_serde_names() {
        let value = serde_json::to_value(ConflictResolution::Merge).unwrap();
        assert_eq!(value, "MERGE");
    }
}
