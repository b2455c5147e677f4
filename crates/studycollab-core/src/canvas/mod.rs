//! Collaborative canvas: document state, broadcast transport and presence.

mod collaboration;
mod document;
mod presence;
mod transport;

pub use collaboration::CanvasCollaboration;
pub use document::{CanvasDocument, CanvasSnapshot, ChangeOutcome};
pub use presence::{ConnectionState, ConnectionStatus, PresenceEntry, PresenceTracker};
pub use transport::{
    BroadcastTransport, ChannelEvent, ChannelMessage, ChannelSubscription, LocalChannelHub,
};
