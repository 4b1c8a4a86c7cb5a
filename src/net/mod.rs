//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener::start(address, app, timeouts)
//!     → serve task binds, reports Listening
//!     → accept loop, one task per connection (connection.rs tracks them)
//!     → handle.shutdown(): stop accepting, drain
//!     → handle.close(): abort every connection
//!     → exactly one outcome on the exit channel
//! ```
//!
//! # Design Decisions
//! - The handle is the only way to stop the serve task
//! - Read/write guards live here, below the per-request deadline, as
//!   absolute deadlines on each body (body.rs)

pub mod body;
pub mod connection;
pub mod listener;

pub use listener::{CloseError, ConnectionTimeouts, ListenerError, ListenerExit, ListenerHandle};
