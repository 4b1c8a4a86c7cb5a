//! Outcome errors of a server run.

use std::time::Duration;

use tokio::time::error::Elapsed;

use crate::config::ConfigError;
use crate::net::{CloseError, ListenerError};

/// In-flight requests outlived the shutdown budget.
#[derive(Debug, thiserror::Error)]
#[error("in-flight requests did not finish within {budget:?}")]
pub struct ShutdownTimeout {
    pub budget: Duration,
    #[source]
    pub cause: Elapsed,
}

/// Terminal outcome of a failed server run.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error("graceful shutdown timed out: {0}")]
    GracefulTimeout(#[source] ShutdownTimeout),

    #[error("graceful shutdown timed out ({timeout}) and forced close failed: {close}")]
    HardClose {
        timeout: ShutdownTimeout,
        #[source]
        close: CloseError,
    },
}

impl ServerError {
    /// True when the run ended because the in-flight drain ran out of time.
    pub fn is_timeout(&self) -> bool {
        self.shutdown_timeout().is_some()
    }

    /// The drain timeout behind this error, if any.
    pub fn shutdown_timeout(&self) -> Option<&ShutdownTimeout> {
        match self {
            ServerError::GracefulTimeout(timeout) | ServerError::HardClose { timeout, .. } => {
                Some(timeout)
            }
            _ => None,
        }
    }

    /// The forced-close failure, only present on the doubly failed path.
    pub fn close_error(&self) -> Option<&CloseError> {
        match self {
            ServerError::HardClose { close, .. } => Some(close),
            _ => None,
        }
    }

    /// Short label used for the shutdown outcome metric.
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            ServerError::Config(_) => "config",
            ServerError::Signals(_) => "signals",
            ServerError::Listener(_) => "listener",
            ServerError::GracefulTimeout(_) => "timeout",
            ServerError::HardClose { .. } => "hard_close",
        }
    }
}
