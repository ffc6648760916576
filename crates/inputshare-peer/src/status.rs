//! Connection status for observers.
//!
//! The sessions publish coarse state through a `watch` channel; whoever
//! renders it (CLI log line, menu-bar icon) subscribes and reads the latest
//! value. No UI types cross this boundary.

use tokio::sync::watch;

/// User-visible connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not connected. Carries a display-ready reason after a failure.
    Disconnected { reason: Option<String> },
    Connecting,
    Connected,
    /// A handoff is active and this host is part of it.
    Forwarding,
}

impl SessionStatus {
    pub fn disconnected() -> Self {
        SessionStatus::Disconnected { reason: None }
    }

    pub fn disconnected_because(reason: impl Into<String>) -> Self {
        SessionStatus::Disconnected {
            reason: Some(reason.into()),
        }
    }
}

/// Publisher half of the status feed.
pub struct StatusFeed {
    tx: watch::Sender<SessionStatus>,
}

impl StatusFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionStatus::disconnected());
        Self { tx }
    }

    /// Publishes a new status. Observers always see the latest value, not
    /// the history.
    pub fn publish(&self, status: SessionStatus) {
        // send() fails only when every receiver is gone, which is fine.
        let _ = self.tx.send(status);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SessionStatus {
        self.tx.borrow().clone()
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
