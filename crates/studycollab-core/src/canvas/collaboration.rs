//! Collaboration handle for one study group's canvas.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::auth::Identity;
use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::models::{
    canvas_channel, CanvasChange, CanvasElement, ChangeType, Position, CANVAS_CHANGE_EVENT,
};
use crate::sync::Backoff;

use super::document::{CanvasDocument, CanvasSnapshot, ChangeOutcome};
use super::presence::{ConnectionState, PresenceEntry, PresenceTracker};
use super::transport::{BroadcastTransport, ChannelEvent, ChannelMessage, ChannelSubscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared canvas for one group over a `BroadcastTransport`
#[derive(Debug)]
pub struct CanvasCollaboration<T> {
    transport: T,
    group_id: String,
    channel: String,
    identity: Identity,
    clock: SharedClock,
    backoff: Backoff,
    document: Mutex<CanvasDocument>,
    presence: Mutex<PresenceTracker>,
    connection: Mutex<ConnectionState>,
    last_sent: Mutex<Option<i64>>,
    subscription: tokio::sync::Mutex<Option<ChannelSubscription>>,
}

impl<T: BroadcastTransport> CanvasCollaboration<T> {
    pub fn new(transport: T, group_id: &str, identity: Identity, clock: SharedClock) -> Self {
        Self {
            transport,
            group_id: group_id.to_string(),
            channel: canvas_channel(group_id),
            identity,
            clock,
            backoff: Backoff::new(1_000, 30_000),
            document: Mutex::new(CanvasDocument::new()),
            presence: Mutex::new(PresenceTracker::new()),
            connection: Mutex::new(ConnectionState::default()),
            last_sent: Mutex::new(None),
            subscription: tokio::sync::Mutex::new(None),
        }
    }

    /// Backoff used by `reconnect`.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.connection).clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.connection).is_connected
    }

    pub fn online_users(&self) -> Vec<PresenceEntry> {
        lock(&self.presence).online_users()
    }

    /// Elements in paint order.
    pub fn elements(&self) -> Vec<CanvasElement> {
        lock(&self.document)
            .elements_in_paint_order()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        lock(&self.document).snapshot()
    }

    pub fn load_snapshot(&self, snapshot: CanvasSnapshot) {
        lock(&self.document).load_snapshot(snapshot);
    }

    /// Timestamp of the last change this client broadcast.
    pub fn last_sent_timestamp(&self) -> Option<i64> {
        *lock(&self.last_sent)
    }

    /// Subscribe to the group's channel and announce presence.
    pub async fn connect(&self) -> Result<()> {
        self.identity.ensure_valid(self.clock.now_ms())?;
        lock(&self.connection).connecting();

        match self.join().await {
            Ok(subscription) => {
                lock(&self.presence).sync(subscription.presence_state().iter().cloned());
                *self.subscription.lock().await = Some(subscription);
                lock(&self.connection).subscribed();
                tracing::info!("Connected to {}", self.channel);
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Failed to connect to {}: {error}", self.channel);
                lock(&self.connection).failed(error.to_string());
                Err(error)
            }
        }
    }

    async fn join(&self) -> Result<ChannelSubscription> {
        let subscription = self
            .transport
            .subscribe(&self.channel, &self.identity.user_id)
            .await?;
        self.transport
            .track(&self.channel, self.presence_entry(None))
            .await?;
        Ok(subscription)
    }

    /// Retry `connect` with exponential backoff. Returns the attempt that
    /// succeeded, or the last error once `max_attempts` is spent.
    pub async fn reconnect(&self, max_attempts: u32) -> Result<u32> {
        let mut last_error = Error::Transport(format!("no attempt made to join {}", self.channel));
        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.backoff.delay(attempt - 1)).await;
            match self.connect().await {
                Ok(()) => return Ok(attempt),
                Err(error @ Error::Unauthenticated(_)) => return Err(error),
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }

    /// Leave the channel. Presence removal is best effort.
    pub async fn disconnect(&self) {
        if let Err(error) = self
            .transport
            .untrack(&self.channel, &self.identity.user_id)
            .await
        {
            tracing::debug!("Failed to untrack presence on {}: {error}", self.channel);
        }
        *self.subscription.lock().await = None;
        lock(&self.presence).sync([]);
        lock(&self.connection).unsubscribed();
        tracing::info!("Disconnected from {}", self.channel);
    }

    /// Publish a local change and apply it to the document.
    ///
    /// Changes are not queued while disconnected; a failed publish marks the
    /// connection as lost and the change is not applied.
    pub async fn broadcast_change(
        &self,
        change_type: ChangeType,
        element: CanvasElement,
    ) -> Result<CanvasChange> {
        let now = self.clock.now_ms();
        self.identity.ensure_valid(now)?;
        if !self.is_connected() {
            return Err(Error::Transport(format!("not connected to {}", self.channel)));
        }

        // Strictly increasing per sender so same-millisecond edits are not stale
        let timestamp = {
            let mut last_sent = lock(&self.last_sent);
            let timestamp = last_sent.map_or(now, |last| now.max(last + 1));
            *last_sent = Some(timestamp);
            timestamp
        };
        let change = CanvasChange::new(change_type, element, &self.identity.user_id, timestamp);
        let message = ChannelMessage::new(
            &self.channel,
            CANVAS_CHANGE_EVENT,
            &self.identity.user_id,
            serde_json::to_value(&change)?,
        );

        if let Err(error) = self.transport.publish(message).await {
            tracing::warn!("Lost connection to {}: {error}", self.channel);
            lock(&self.connection).failed(error.to_string());
            return Err(error);
        }

        lock(&self.document).apply(&change);
        Ok(change)
    }

    /// Apply a change received from another participant.
    pub fn on_remote_change(&self, change: &CanvasChange) -> ChangeOutcome {
        if change.user_id == self.identity.user_id {
            return ChangeOutcome::SelfEcho;
        }
        let outcome = lock(&self.document).apply(change);
        match outcome {
            ChangeOutcome::MissingTarget => tracing::debug!(
                "Ignoring {} for unknown element {}",
                change.change_type,
                change.element.id
            ),
            ChangeOutcome::Stale => tracing::debug!(
                "Ignoring stale {} for element {}",
                change.change_type,
                change.element.id
            ),
            _ => {}
        }
        outcome
    }

    /// Route one channel event. Returns the outcome for canvas changes.
    pub fn handle_event(&self, event: ChannelEvent) -> Option<ChangeOutcome> {
        match event {
            ChannelEvent::Broadcast(message) if message.event == CANVAS_CHANGE_EVENT => {
                match serde_json::from_value::<CanvasChange>(message.payload) {
                    Ok(change) => Some(self.on_remote_change(&change)),
                    Err(error) => {
                        tracing::warn!(
                            "Dropping malformed canvas change from {}: {error}",
                            message.sender
                        );
                        None
                    }
                }
            }
            ChannelEvent::Broadcast(_) => None,
            ChannelEvent::PresenceJoin(entry) => {
                lock(&self.presence).join(entry);
                None
            }
            ChannelEvent::PresenceLeave(user_id) => {
                lock(&self.presence).leave(&user_id);
                None
            }
        }
    }

    /// Handle every buffered event without waiting.
    pub async fn poll(&self) -> Result<Vec<ChangeOutcome>> {
        let mut subscription = self.subscription.lock().await;
        let subscription = subscription
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("not subscribed to {}", self.channel)))?;

        let mut outcomes = Vec::new();
        while let Some(event) = subscription.try_recv() {
            outcomes.extend(self.handle_event(event));
        }
        Ok(outcomes)
    }

    /// Wait for the next canvas change, handling presence events on the way.
    /// `None` once the channel closes.
    pub async fn next_change(&self) -> Result<Option<ChangeOutcome>> {
        let mut subscription = self.subscription.lock().await;
        let subscription = subscription
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("not subscribed to {}", self.channel)))?;

        while let Some(event) = subscription.recv().await {
            if let Some(outcome) = self.handle_event(event) {
                return Ok(Some(outcome));
            }
        }
        lock(&self.connection).unsubscribed();
        Ok(None)
    }

    /// Share the local cursor position with the channel.
    pub async fn update_cursor(&self, position: Position) -> Result<()> {
        self.transport
            .track(&self.channel, self.presence_entry(Some(position)))
            .await
    }

    fn presence_entry(&self, cursor: Option<Position>) -> PresenceEntry {
        PresenceEntry {
            user_id: self.identity.user_id.clone(),
            email: self.identity.email.clone(),
            online_at: self.clock.now_ms(),
            cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::LocalChannelHub;
    use crate::clock::ManualClock;
    use crate::models::{ElementKind, StickyProperties};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn participant(
        hub: &LocalChannelHub,
        user_id: &str,
        clock: &Arc<ManualClock>,
    ) -> CanvasCollaboration<LocalChannelHub> {
        CanvasCollaboration::new(
            hub.clone(),
            "g1",
            Identity::new(user_id, "token").with_email(format!("{user_id}@example.edu")),
            clock.clone(),
        )
        .with_backoff(Backoff::new(1, 4))
    }

    fn sticky(id: &str, text: &str) -> CanvasElement {
        CanvasElement::new(
            ElementKind::Sticky(StickyProperties {
                text: text.to_string(),
                color: "#ffeb3b".to_string(),
                width: 120.0,
                height: 80.0,
            }),
            Position::new(5.0, 5.0),
            0,
        )
        .with_id(id)
    }

    fn sticky_text(collaboration: &CanvasCollaboration<LocalChannelHub>) -> Vec<String> {
        collaboration
            .elements()
            .into_iter()
            .filter_map(|element| match element.kind {
                ElementKind::Sticky(properties) => Some(properties.text),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_changes_reach_other_participants() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let alice = participant(&hub, "alice", &clock);
        let bob = participant(&hub, "bob", &clock);
        alice.connect().await.unwrap();
        bob.connect().await.unwrap();

        let change = alice
            .broadcast_change(ChangeType::Add, sticky("e1", "Read chapter 3"))
            .await
            .unwrap();
        assert_eq!(alice.last_sent_timestamp(), Some(change.timestamp));
        assert_eq!(sticky_text(&alice), vec!["Read chapter 3"]);

        assert_eq!(bob.poll().await.unwrap(), vec![ChangeOutcome::Applied]);
        assert_eq!(sticky_text(&bob), vec!["Read chapter 3"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_self_echo_is_ignored() {
        let hub = LocalChannelHub::new().with_self_echo(true);
        let clock = Arc::new(ManualClock::new(1_000));
        let alice = participant(&hub, "alice", &clock);
        alice.connect().await.unwrap();

        alice
            .broadcast_change(ChangeType::Add, sticky("e1", "mine"))
            .await
            .unwrap();

        assert_eq!(alice.poll().await.unwrap(), vec![ChangeOutcome::SelfEcho]);
        assert_eq!(alice.elements().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_out_of_order_remote_updates() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let bob = participant(&hub, "bob", &clock);

        let add = CanvasChange::new(ChangeType::Add, sticky("e1", "v0"), "alice", 50);
        let newer = CanvasChange::new(ChangeType::Update, sticky("e1", "v200"), "alice", 200);
        let older = CanvasChange::new(ChangeType::Update, sticky("e1", "v100"), "carol", 100);

        assert_eq!(bob.on_remote_change(&add), ChangeOutcome::Applied);
        assert_eq!(bob.on_remote_change(&newer), ChangeOutcome::Applied);
        assert_eq!(bob.on_remote_change(&older), ChangeOutcome::Stale);
        assert_eq!(sticky_text(&bob), vec!["v200"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_millisecond_edits_stay_ordered() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let alice = participant(&hub, "alice", &clock);
        alice.connect().await.unwrap();

        let first = alice
            .broadcast_change(ChangeType::Add, sticky("e1", "one"))
            .await
            .unwrap();
        let second = alice
            .broadcast_change(ChangeType::Update, sticky("e1", "two"))
            .await
            .unwrap();

        assert!(second.timestamp > first.timestamp);
        assert_eq!(sticky_text(&alice), vec!["two"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_presence_follows_joins_and_leaves() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let alice = participant(&hub, "alice", &clock);
        let bob = participant(&hub, "bob", &clock);
        alice.connect().await.unwrap();
        clock.advance(10);
        bob.connect().await.unwrap();

        alice.poll().await.unwrap();
        let users: Vec<String> = alice
            .online_users()
            .into_iter()
            .map(|entry| entry.user_id)
            .collect();
        assert_eq!(users, vec!["alice", "bob"]);

        bob.disconnect().await;
        alice.poll().await.unwrap();
        assert_eq!(alice.online_users().len(), 1);
        assert!(!bob.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connection_failure_and_reconnect() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let alice = participant(&hub, "alice", &clock);
        hub.set_available(false).unwrap();

        assert!(matches!(alice.connect().await, Err(Error::Transport(_))));
        let state = alice.connection_state();
        assert!(!state.is_connected);
        assert!(state.last_error.is_some());

        let result = alice
            .broadcast_change(ChangeType::Add, sticky("e1", "lost"))
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(alice.elements().is_empty());

        assert!(alice.reconnect(2).await.is_err());
        hub.set_available(true).unwrap();
        assert_eq!(alice.reconnect(3).await.unwrap(), 1);
        assert!(alice.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_publish_failure_marks_disconnected() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let alice = participant(&hub, "alice", &clock);
        alice.connect().await.unwrap();
        hub.set_available(false).unwrap();

        let result = alice
            .broadcast_change(ChangeType::Add, sticky("e1", "x"))
            .await;

        assert!(result.is_err());
        assert!(!alice.is_connected());
        assert!(alice.elements().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_identity_cannot_connect() {
        let hub = LocalChannelHub::new();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let alice = CanvasCollaboration::new(
            hub,
            "g1",
            Identity::new("alice", "token").with_expires_at(500),
            clock,
        );

        assert!(matches!(alice.connect().await, Err(Error::Unauthenticated(_))));
    }
}
