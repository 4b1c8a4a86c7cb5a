//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)  or  ServerBuilder
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, timeout budget invariant)
//!     → ServerConfig (validated, immutable)
//!     → validated again when the lifecycle enters Starting
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a server is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{LogFormat, LoggingConfig, ServerConfig, TimeoutConfig};
pub use validation::ValidationError;
