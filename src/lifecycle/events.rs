//! Lifecycle event broadcasting.

use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::lifecycle::state::LifecycleState;

/// Something observable that happened during a server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The controller moved to a new state.
    Transition(LifecycleState),
    /// The listener bound its socket.
    Listening(SocketAddr),
}

/// Broadcaster for lifecycle events.
///
/// Any number of observers can subscribe before the server starts. Sends
/// never block and are dropped when nobody listens.
#[derive(Debug, Clone)]
pub struct LifecycleEvents {
    /// Broadcast channel sender.
    tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleEvents {
    /// Create a new broadcaster.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn transition(&self, state: LifecycleState) {
        let _ = self.tx.send(LifecycleEvent::Transition(state));
    }

    pub(crate) fn listening(&self, addr: SocketAddr) {
        let _ = self.tx.send(LifecycleEvent::Listening(addr));
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self::new()
    }
}
