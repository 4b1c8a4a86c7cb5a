//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (controller.rs):
//!     Validate config → Install signal observer → Launch listener → Running
//!
//! Shutdown (controller.rs):
//!     Signal received → Disarm → Stop accepting → Drain → Task wait → Stopped
//!                                                 ↘ timeout → Forced close
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/`/stop` → Trigger graceful shutdown
//!     Repeat SIGTERM/SIGINT → Immediate process exit
//!
//! Events (events.rs):
//!     Every transition and the bound address, broadcast to subscribers
//! ```
//!
//! # Design Decisions
//! - One run per controller; states are never revisited
//! - Shutdown has a deadline: forced close after `shutdown_in_flight`
//! - The signal source is injectable so tests never need real signals

pub mod controller;
pub mod events;
pub mod signals;
pub mod state;

pub use controller::Lifecycle;
pub use events::{LifecycleEvent, LifecycleEvents};
pub use signals::{
    stop_channel, ChannelSignals, OsSignals, SignalMode, SignalObserver, StopHandle, StopRequests,
    TerminationSignal,
};
pub use state::LifecycleState;
