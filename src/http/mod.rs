//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (net::listener)
//!     → server.rs (middleware: request ID, trace, access log)
//!     → deadline.rs (per-request budget, 408 on expiry)
//!     → handlers.rs (pre-loaded) or application routes
//!     → response
//! ```

pub mod deadline;
pub mod handlers;
pub mod server;

pub use deadline::REQUEST_TIMEOUT_MESSAGE;
pub use handlers::{Handler, ReadinessCheck};
pub use server::{Server, ServerBuilder};
