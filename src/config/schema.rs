//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name of the server, used in logs and `/debug/vars`.
    pub name: String,

    /// TCP address to listen on (e.g., "0.0.0.0:4446" or ":4446").
    pub address: String,

    /// Publish `/debug/vars` and `/metrics`, and record request metrics.
    pub enable_metrics: bool,

    /// Wrap requests in trace spans and set/propagate `x-request-id`.
    pub enable_telemetry: bool,

    /// Logging fine-control.
    pub logging: LoggingConfig,

    /// Timeout budget.
    pub timeouts: TimeoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "webserver".to_string(),
            address: "0.0.0.0:4446".to_string(),
            enable_metrics: true,
            enable_telemetry: true,
            logging: LoggingConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a config with the given name and address and defaults elsewhere.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    /// Resolve the configured address into a socket address.
    ///
    /// Accepts the `:port` shorthand, which binds every interface.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        parse_address(&self.address)
    }
}

pub(crate) fn parse_address(address: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port).parse(),
        None => address.parse(),
    }
}

/// Output format of the console and file log layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for lifecycle and application output
    /// (none, fatal, error, warn, info, debug, trace).
    pub console_level: String,

    /// Level for the per-request access log.
    pub request_level: String,

    /// Optional file to also write logs to. "-" means console only.
    pub filepath: Option<String>,

    /// Log line format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: "error".to_string(),
            request_level: "error".to_string(),
            filepath: None,
            format: LogFormat::Pretty,
        }
    }
}

/// The timeout budget: five durations fixed before start.
///
/// `request` must be strictly less than `read`; every duration must be
/// non-zero. See [`crate::config::validation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Max duration for reading an entire request, including the body.
    #[serde(with = "humantime_serde")]
    pub read: Duration,

    /// Max duration a handler may run before the request is answered
    /// with a timeout response.
    #[serde(with = "humantime_serde")]
    pub request: Duration,

    /// Max duration to wait for in-flight requests once shutdown begins.
    #[serde(with = "humantime_serde")]
    pub shutdown_in_flight: Duration,

    /// Fixed pause after draining, for flushing caches, buffered logs
    /// and exporters.
    #[serde(with = "humantime_serde")]
    pub shutdown_task: Duration,

    /// Max duration for writing the response.
    #[serde(with = "humantime_serde")]
    pub write: Duration,
}

impl TimeoutConfig {
    /// Build a budget from its five durations, in declaration order.
    pub fn new(
        read: Duration,
        request: Duration,
        shutdown_in_flight: Duration,
        shutdown_task: Duration,
        write: Duration,
    ) -> Self {
        Self {
            read,
            request,
            shutdown_in_flight,
            shutdown_task,
            write,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(3),
            request: Duration::from_secs(1),
            shutdown_in_flight: Duration::from_secs(3),
            shutdown_task: Duration::from_secs(10),
            write: Duration::from_secs(3),
        }
    }
}
