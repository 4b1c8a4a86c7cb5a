//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, address parses)
//! - Enforce the timeout budget invariant (`request < read`)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before any socket or signal handler is acquired

use std::time::Duration;

use crate::config::schema::{parse_address, LoggingConfig, ServerConfig, TimeoutConfig};

/// Accepted log level names.
pub const LOG_LEVELS: &[&str] = &["none", "fatal", "error", "warn", "info", "debug", "trace"];

const MIN_NAME_LEN: usize = 3;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Server name is shorter than three characters.
    Name(String),
    /// Address is not a valid TCP socket address.
    Address(String),
    /// A timeout is zero.
    ZeroTimeout(&'static str),
    /// `request` is not strictly below `read`.
    RequestNotBelowRead { request: Duration, read: Duration },
    /// A log level is not one of [`LOG_LEVELS`].
    LogLevel { field: &'static str, value: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Name(name) => {
                write!(f, "name {:?} must be at least {} characters", name, MIN_NAME_LEN)
            }
            ValidationError::Address(addr) => write!(f, "address {:?} is not a valid TCP address", addr),
            ValidationError::ZeroTimeout(field) => write!(f, "timeouts.{} must be greater than zero", field),
            ValidationError::RequestNotBelowRead { request, read } => write!(
                f,
                "timeouts.request ({:?}) must be less than timeouts.read ({:?})",
                request, read
            ),
            ValidationError::LogLevel { field, value } => {
                write!(f, "logging.{} {:?} is not one of {}", field, value, LOG_LEVELS.join(", "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a full server configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.chars().count() < MIN_NAME_LEN {
        errors.push(ValidationError::Name(config.name.clone()));
    }

    if parse_address(&config.address).is_err() {
        errors.push(ValidationError::Address(config.address.clone()));
    }

    errors.extend(check_timeouts(&config.timeouts));
    errors.extend(check_logging(&config.logging));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate only the timeout budget.
pub fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<(), Vec<ValidationError>> {
    let errors = check_timeouts(timeouts);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_timeouts(timeouts: &TimeoutConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let fields = [
        ("read", timeouts.read),
        ("request", timeouts.request),
        ("shutdown_in_flight", timeouts.shutdown_in_flight),
        ("shutdown_task", timeouts.shutdown_task),
        ("write", timeouts.write),
    ];
    for (field, value) in fields {
        if value.is_zero() {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    if timeouts.request >= timeouts.read {
        errors.push(ValidationError::RequestNotBelowRead {
            request: timeouts.request,
            read: timeouts.read,
        });
    }

    errors
}

fn check_logging(logging: &LoggingConfig) -> Vec<ValidationError> {
    [
        ("console_level", &logging.console_level),
        ("request_level", &logging.request_level),
    ]
    .into_iter()
    .filter(|(_, value)| !LOG_LEVELS.contains(&value.as_str()))
    .map(|(field, value)| ValidationError::LogLevel {
        field,
        value: value.clone(),
    })
    .collect()
}
