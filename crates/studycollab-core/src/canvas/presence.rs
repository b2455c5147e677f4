//! Presence and connection tracking for a canvas channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Position;

/// One user present on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub email: Option<String>,
    /// Join time (Unix ms)
    pub online_at: i64,
    pub cursor: Option<Position>,
}

impl PresenceEntry {
    pub fn new(user_id: impl Into<String>, online_at: i64) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            online_at,
            cursor: None,
        }
    }
}

/// Users present on one channel, keyed by user id
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    users: BTreeMap<String, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a user. Returns true for a new arrival.
    pub fn join(&mut self, entry: PresenceEntry) -> bool {
        self.users.insert(entry.user_id.clone(), entry).is_none()
    }

    pub fn leave(&mut self, user_id: &str) -> Option<PresenceEntry> {
        self.users.remove(user_id)
    }

    /// Replace the full presence set.
    pub fn sync(&mut self, entries: impl IntoIterator<Item = PresenceEntry>) {
        self.users = entries
            .into_iter()
            .map(|entry| (entry.user_id.clone(), entry))
            .collect();
    }

    /// Present users, earliest arrival first.
    pub fn online_users(&self) -> Vec<PresenceEntry> {
        let mut users: Vec<PresenceEntry> = self.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.online_at
                .cmp(&b.online_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Channel lifecycle: `Connecting -> Subscribed -> {Unsubscribed | Error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Subscribed,
    Unsubscribed,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn connecting(&mut self) {
        self.is_connected = false;
        self.status = ConnectionStatus::Connecting;
    }

    pub fn subscribed(&mut self) {
        self.is_connected = true;
        self.status = ConnectionStatus::Subscribed;
        self.last_error = None;
    }

    pub fn unsubscribed(&mut self) {
        self.is_connected = false;
        self.status = ConnectionStatus::Unsubscribed;
    }

    pub fn failed(&mut self, error: impl Into<String>) {
        self.is_connected = false;
        self.status = ConnectionStatus::Error;
        self.last_error = Some(error.into());
    }
}
