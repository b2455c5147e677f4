use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] studycollab_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON argument: {0}")]
    InvalidJson(String),
    #[error("Cache key cannot be empty")]
    EmptyKey,
    #[error("Sync error not found for id/prefix: {0}")]
    SyncErrorNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Not signed in. Set STUDYCOLLAB_USER_ID and STUDYCOLLAB_ACCESS_TOKEN (or add them to .env)."
    )]
    NotSignedIn,
}
