//! Sync queue and reconciliation against the remote store.

mod backoff;
mod conflict;
mod engine;
mod http;
mod queue;
mod remote;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::Backoff;
pub use conflict::{has_diverged, merge_records};
pub use engine::{
    CancelToken, DrainOptions, DrainStatus, ItemOutcome, RetryDecision, SyncEngine, SyncReport,
};
pub use http::{effective_type_for_rtt, HttpRemoteStore};
pub use queue::SyncQueue;
pub use remote::{OfflineRemote, RemoteError, RemoteResult, RemoteStore};
