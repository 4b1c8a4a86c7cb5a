//! Lifecycle states and the transitions allowed between them.

use std::fmt;

/// Where a server is in its single-use lifetime.
///
/// ```text
/// Idle → Starting → Running → ShuttingDownGraceful → ShuttingDownHard → Stopped
///           │          │              │                     │
///           └──────────┴──────────────┴─────────────────────┴──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, not started.
    Idle,
    /// Validating configuration and launching the listener.
    Starting,
    /// Listener launched, waiting for a signal or a listener exit.
    Running,
    /// Refusing new connections, draining in-flight requests.
    ShuttingDownGraceful,
    /// Drain budget exceeded, connections are being aborted.
    ShuttingDownHard,
    /// Terminal: the lifecycle ended after a shutdown sequence.
    Stopped,
    /// Terminal: configuration, listener or hard-close failure.
    Failed,
}

impl LifecycleState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }

    /// Whether moving from `self` to `next` is a legal, forward-only step.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, ShuttingDownGraceful)
                | (Running, Stopped)
                | (Running, Failed)
                | (ShuttingDownGraceful, ShuttingDownHard)
                | (ShuttingDownGraceful, Stopped)
                | (ShuttingDownGraceful, Failed)
                | (ShuttingDownHard, Stopped)
                | (ShuttingDownHard, Failed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDownGraceful => "shutting-down-graceful",
            LifecycleState::ShuttingDownHard => "shutting-down-hard",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}
