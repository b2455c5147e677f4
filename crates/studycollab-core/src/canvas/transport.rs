//! Pub/sub transport for canvas channels.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use super::presence::PresenceEntry;
use crate::error::{Error, Result};

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast payload on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub event: String,
    /// User id of the publisher
    pub sender: String,
    pub payload: Value,
}

impl ChannelMessage {
    pub fn new(
        channel: impl Into<String>,
        event: impl Into<String>,
        sender: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            channel: channel.into(),
            event: event.into(),
            sender: sender.into(),
            payload,
        }
    }
}

/// Event delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Broadcast(ChannelMessage),
    PresenceJoin(PresenceEntry),
    PresenceLeave(String),
}

/// Channel-scoped broadcast and presence (async)
#[allow(async_fn_in_trait)]
pub trait BroadcastTransport {
    /// Join `channel` as `user_id`.
    async fn subscribe(&self, channel: &str, user_id: &str) -> Result<ChannelSubscription>;

    async fn publish(&self, message: ChannelMessage) -> Result<()>;

    /// Announce presence on `channel`.
    async fn track(&self, channel: &str, entry: PresenceEntry) -> Result<()>;

    async fn untrack(&self, channel: &str, user_id: &str) -> Result<()>;
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct ChannelSubscription {
    channel: String,
    user_id: String,
    receive_self: bool,
    presence: Vec<PresenceEntry>,
    rx: broadcast::Receiver<ChannelEvent>,
}

impl ChannelSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Presence set at the time of subscribing.
    pub fn presence_state(&self) -> &[PresenceEntry] {
        &self.presence
    }

    /// Wait for the next event. `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.is_own_echo(&event) => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Channel {} dropped {skipped} events", self.channel);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event, without waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.is_own_echo(&event) => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Channel {} dropped {skipped} events", self.channel);
                }
                Err(_) => return None,
            }
        }
    }

    fn is_own_echo(&self, event: &ChannelEvent) -> bool {
        !self.receive_self
            && matches!(event, ChannelEvent::Broadcast(message) if message.sender == self.user_id)
    }
}

#[derive(Debug)]
struct HubState {
    channels: HashMap<String, broadcast::Sender<ChannelEvent>>,
    presence: HashMap<String, BTreeMap<String, PresenceEntry>>,
    available: bool,
}

/// In-process hub; clones share channels
#[derive(Debug, Clone)]
pub struct LocalChannelHub {
    state: Arc<Mutex<HubState>>,
    capacity: usize,
    self_echo: bool,
}

impl Default for LocalChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChannelHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                channels: HashMap::new(),
                presence: HashMap::new(),
                available: true,
            })),
            capacity: DEFAULT_CAPACITY,
            self_echo: false,
        }
    }

    /// Deliver a subscriber's own broadcasts back to it.
    #[must_use]
    pub const fn with_self_echo(mut self, enabled: bool) -> Self {
        self.self_echo = enabled;
        self
    }

    /// Simulate the hub going down or coming back.
    pub fn set_available(&self, available: bool) -> Result<()> {
        self.lock()?.available = available;
        Ok(())
    }

    /// Users currently tracked on `channel`.
    pub fn presence(&self, channel: &str) -> Result<Vec<PresenceEntry>> {
        Ok(self
            .lock()?
            .presence
            .get(channel)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubState>> {
        self.state
            .lock()
            .map_err(|_| Error::Transport("channel hub lock poisoned".to_string()))
    }

    fn available(&self) -> Result<MutexGuard<'_, HubState>> {
        let state = self.lock()?;
        if state.available {
            Ok(state)
        } else {
            Err(Error::Transport("channel hub unavailable".to_string()))
        }
    }

    fn send(state: &HubState, channel: &str, event: ChannelEvent) {
        if let Some(sender) = state.channels.get(channel) {
            // No receivers is not an error for a broadcast
            let _ = sender.send(event);
        }
    }
}

impl BroadcastTransport for LocalChannelHub {
    async fn subscribe(&self, channel: &str, user_id: &str) -> Result<ChannelSubscription> {
        let mut state = self.available()?;
        let capacity = self.capacity;
        let rx = state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        let presence = state
            .presence
            .get(channel)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();

        tracing::debug!("{user_id} subscribed to {channel}");
        Ok(ChannelSubscription {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            receive_self: self.self_echo,
            presence,
            rx,
        })
    }

    async fn publish(&self, message: ChannelMessage) -> Result<()> {
        let state = self.available()?;
        let channel = message.channel.clone();
        Self::send(&state, &channel, ChannelEvent::Broadcast(message));
        Ok(())
    }

    async fn track(&self, channel: &str, entry: PresenceEntry) -> Result<()> {
        let mut state = self.available()?;
        state
            .presence
            .entry(channel.to_string())
            .or_default()
            .insert(entry.user_id.clone(), entry.clone());
        Self::send(&state, channel, ChannelEvent::PresenceJoin(entry));
        Ok(())
    }

    async fn untrack(&self, channel: &str, user_id: &str) -> Result<()> {
        let mut state = self.available()?;
        let removed = state
            .presence
            .get_mut(channel)
            .and_then(|users| users.remove(user_id));
        if removed.is_some() {
            Self::send(
                &state,
                channel,
                ChannelEvent::PresenceLeave(user_id.to_string()),
            );
        }
        Ok(())
    }
}
