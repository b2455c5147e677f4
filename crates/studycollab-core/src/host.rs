//! Optional desktop host bridge.
//!
//! Core behavior never depends on a bridge being present; notifications are
//! best effort.

/// Calls exposed by a desktop shell
pub trait HostBridge: Send + Sync + std::fmt::Debug {
    /// Whether the bridge is backed by a real host
    fn is_available(&self) -> bool;

    /// Show a user notification.
    fn notify(&self, title: &str, body: &str);
}

/// Bridge used when no desktop shell is present
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostBridge;

impl HostBridge for NoopHostBridge {
    fn is_available(&self) -> bool {
        false
    }

    fn notify(&self, _title: &str, _body: &str) {}
}

/// Bridge that writes notifications to the log (used by the CLI)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHostBridge;

impl HostBridge for LogHostBridge {
    fn is_available(&self) -> bool {
        true
    }

    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, "{body}");
    }
}
