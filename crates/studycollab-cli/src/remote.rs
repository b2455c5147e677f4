//! Remote store selected at startup.

use serde_json::Value;
use studycollab_core::models::NetworkStatus;
use studycollab_core::sync::{HttpRemoteStore, OfflineRemote, RemoteResult, RemoteStore};

/// PostgREST when a remote and identity are configured, otherwise offline
#[derive(Debug)]
pub enum CliRemote {
    Http(HttpRemoteStore),
    Offline(OfflineRemote),
}

impl CliRemote {
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }
}

impl RemoteStore for CliRemote {
    async fn create(&self, table: &str, data: &Value) -> RemoteResult<Value> {
        match self {
            Self::Http(remote) => remote.create(table, data).await,
            Self::Offline(remote) => remote.create(table, data).await,
        }
    }

    async fn update(&self, table: &str, id: &str, data: &Value) -> RemoteResult<Value> {
        match self {
            Self::Http(remote) => remote.update(table, id, data).await,
            Self::Offline(remote) => remote.update(table, id, data).await,
        }
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        match self {
            Self::Http(remote) => remote.delete(table, id).await,
            Self::Offline(remote) => remote.delete(table, id).await,
        }
    }

    async fn fetch(&self, table: &str, id: &str) -> RemoteResult<Option<Value>> {
        match self {
            Self::Http(remote) => remote.fetch(table, id).await,
            Self::Offline(remote) => remote.fetch(table, id).await,
        }
    }

    async fn fetch_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<i64>,
    ) -> RemoteResult<Vec<Value>> {
        match self {
            Self::Http(remote) => remote.fetch_since(table, user_id, since).await,
            Self::Offline(remote) => remote.fetch_since(table, user_id, since).await,
        }
    }

    async fn probe(&self) -> RemoteResult<NetworkStatus> {
        match self {
            Self::Http(remote) => remote.probe().await,
            Self::Offline(remote) => remote.probe().await,
        }
    }
}
