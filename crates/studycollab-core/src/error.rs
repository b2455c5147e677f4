//! Error types for studycollab-core

use thiserror::Error;

/// Result type alias using studycollab-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in studycollab-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Cache miss or expired entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cached payload no longer matches its checksum
    #[error("Corrupted cache entry: {0}")]
    Corruption(String),

    /// Transient remote failure
    #[error("Network error: {0}")]
    Network(String),

    /// Remote state diverged from the local change
    #[error("Conflict on {table}/{entity_id}")]
    Conflict { table: String, entity_id: String },

    /// Payload rejected locally or by the remote store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue item gave up after its retry budget
    #[error("Sync item {item_id} failed after {attempts} attempts")]
    ExhaustedRetries { item_id: String, attempts: u32 },

    /// Missing or expired identity
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// A drain is already running
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Pub/sub transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error should be treated as a cache miss by callers.
    pub const fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Corruption(_))
    }
}
