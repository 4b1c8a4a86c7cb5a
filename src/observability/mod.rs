//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle controller, listener, middleware produce:
//!     → logging.rs (structured log events, access log target)
//!     → metrics.rs (counters, gauges, histograms)
//!     → access.rs (one line + metrics per request)
//!
//! Consumers:
//!     → stdout / file
//!     → /metrics (Prometheus scrape)
//!     → /debug/vars (server info)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber; binaries call `logging::init`
//! - The server's logger is a `tracing::Span` passed around explicitly
//! - Metrics are cheap and optional

pub mod access;
pub mod logging;
pub mod metrics;
