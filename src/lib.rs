//! HTTP server with a supervised lifecycle.
//!
//! A [`Server`] serves an axum router until a termination signal (SIGINT,
//! SIGTERM or `/stop`) arrives, then drains in-flight requests within a
//! bounded budget, escalating to a forced close when the budget runs out.
//! A repeated signal exits the process immediately.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ServerConfig, TimeoutConfig};
pub use error::ServerError;
pub use http::{Server, ServerBuilder};
pub use lifecycle::{LifecycleEvent, LifecycleState, SignalMode};
