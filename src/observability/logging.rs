//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide tracing subscriber from [`LoggingConfig`]
//! - Map configured level names onto filter directives
//! - Optionally mirror output to a file
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured levels
//! - Access log lines use their own target so they can be filtered apart

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Target of the per-request access log.
pub const ACCESS_TARGET: &str = "webserver::access";

/// Error type for logging setup.
#[derive(Debug)]
pub enum LoggingError {
    File(std::io::Error),
    Init(tracing_subscriber::util::TryInitError),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::File(e) => write!(f, "Failed to open log file: {}", e),
            LoggingError::Init(e) => write!(f, "Failed to install subscriber: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Translate a configured level name into a filter directive level.
pub fn directive_level(level: &str) -> &str {
    match level {
        "none" => "off",
        "fatal" => "error",
        other => other,
    }
}

/// Default filter directives for a logging config.
pub fn default_directives(config: &LoggingConfig) -> String {
    format!(
        "{},{}={}",
        directive_level(&config.console_level),
        ACCESS_TARGET,
        directive_level(&config.request_level)
    )
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let console = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let file = match config.filepath.as_deref() {
        None | Some("") | Some("-") => None,
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(LoggingError::File)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            Some(match config.format {
                LogFormat::Pretty => layer.boxed(),
                LogFormat::Json => layer.json().boxed(),
            })
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(LoggingError::Init)
}
