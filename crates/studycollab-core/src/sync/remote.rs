//! Remote store abstraction.

use serde_json::Value;
use thiserror::Error;

use crate::models::{NetworkStatus, SyncErrorKind};

/// Failure reported by a remote store call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("Network unavailable: {0}")]
    Network(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("Server error: {message}")]
    Server { status: u16, message: String },
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// The row changed remotely; `remote` carries it when the server sent it
    #[error("Remote conflict: {message}")]
    Conflict {
        remote: Option<Value>,
        message: String,
    },
    #[error("Rejected by remote: {0}")]
    Validation(String),
    #[error("Remote row not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Remote error: {0}")]
    Unknown(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    /// Classify an HTTP status with its parsed message.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            408 => Self::Network(message),
            409 => Self::Conflict {
                remote: None,
                message,
            },
            429 => Self::RateLimited(message),
            400 | 406 | 413 | 422 => Self::Validation(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Unknown(message),
        }
    }

    /// Worth retrying with backoff
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } | Self::RateLimited(_)
        )
    }

    /// Kind recorded when the error ends up in the error list
    pub const fn kind(&self) -> SyncErrorKind {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } | Self::RateLimited(_) => {
                SyncErrorKind::Network
            }
            Self::Conflict { .. } => SyncErrorKind::Conflict,
            Self::Validation(_) | Self::NotFound(_) => SyncErrorKind::Validation,
            Self::Unauthorized(_) | Self::Unknown(_) => SyncErrorKind::Unknown,
        }
    }
}

impl From<RemoteError> for crate::Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthorized(message) => Self::Unauthenticated(message),
            RemoteError::Validation(message) => Self::Validation(message),
            RemoteError::NotFound(message) => Self::NotFound(message),
            error => Self::Network(error.to_string()),
        }
    }
}

/// Table-scoped CRUD against the remote persistence store (async)
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Insert a row; returns the stored row
    async fn create(&self, table: &str, data: &Value) -> RemoteResult<Value>;

    /// Patch a row by id; returns the stored row
    async fn update(&self, table: &str, id: &str, data: &Value) -> RemoteResult<Value>;

    /// Delete a row by id
    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()>;

    /// Current remote row, `None` when absent
    async fn fetch(&self, table: &str, id: &str) -> RemoteResult<Option<Value>>;

    /// Rows owned by `user_id` with `updated_at > since`, oldest first
    async fn fetch_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<i64>,
    ) -> RemoteResult<Vec<Value>>;

    /// Connectivity probe
    async fn probe(&self) -> RemoteResult<NetworkStatus>;
}

/// Remote used when no backend is configured; every call fails as offline
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

impl OfflineRemote {
    fn unavailable<T>() -> RemoteResult<T> {
        Err(RemoteError::Network("no remote store configured".to_string()))
    }
}

impl RemoteStore for OfflineRemote {
    async fn create(&self, _table: &str, _data: &Value) -> RemoteResult<Value> {
        Self::unavailable()
    }

    async fn update(&self, _table: &str, _id: &str, _data: &Value) -> RemoteResult<Value> {
        Self::unavailable()
    }

    async fn delete(&self, _table: &str, _id: &str) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn fetch(&self, _table: &str, _id: &str) -> RemoteResult<Option<Value>> {
        Self::unavailable()
    }

    async fn fetch_since(
        &self,
        _table: &str,
        _user_id: &str,
        _since: Option<i64>,
    ) -> RemoteResult<Vec<Value>> {
        Self::unavailable()
    }

    async fn probe(&self) -> RemoteResult<NetworkStatus> {
        Ok(NetworkStatus::offline())
    }
}
