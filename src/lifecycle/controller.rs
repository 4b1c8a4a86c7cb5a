//! Lifecycle controller.
//!
//! # Responsibilities
//! - Validate the configuration and install signal handlers at start
//! - Launch the listener and wait on its outcome or a signal
//! - Run the bounded graceful shutdown, escalating to a forced close
//! - Reduce everything to one terminal outcome
//!
//! # Shutdown sequence
//! ```text
//! signal → disarm → stop accepting → wait shutdown_in_flight
//!     drained  → wait shutdown_task → listener outcome
//!     timeout  → forced close → GracefulTimeout / HardClose
//! ```
//!
//! # Design Decisions
//! - Single use: `run` consumes the controller
//! - A listener error beats a pending signal; a "closed" outcome does not
//! - The task wait is a fixed pause, never shortened

use std::io;
use std::net::SocketAddr;

use axum::Router;
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::config::{validation::validate_config, ConfigError, ServerConfig, ValidationError};
use crate::error::{ServerError, ShutdownTimeout};
use crate::lifecycle::{LifecycleEvents, LifecycleState, SignalObserver, TerminationSignal};
use crate::net::listener::{self, ConnectionTimeouts, ListenerError, ListenerExit, ListenerHandle};
use crate::observability::metrics;

/// Drives one server run from `Idle` to a terminal state.
pub struct Lifecycle {
    config: ServerConfig,
    app: Router,
    events: LifecycleEvents,
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new(config: ServerConfig, app: Router, events: LifecycleEvents) -> Self {
        Self {
            config,
            app,
            events,
            state: LifecycleState::Idle,
        }
    }

    /// Run the server until it reaches a terminal state.
    ///
    /// `observe` is called once the configuration is known to be valid, to
    /// subscribe to termination signals.
    pub async fn run<F>(mut self, observe: F) -> Result<(), ServerError>
    where
        F: FnOnce() -> io::Result<Box<dyn SignalObserver>>,
    {
        let outcome = self.drive(observe).await;

        match &outcome {
            Ok(()) => {
                metrics::record_shutdown("ok");
                tracing::info!("Server stopped");
            }
            Err(e) => {
                metrics::record_shutdown(e.outcome());
                tracing::error!(error = %e, state = %self.state, "Server stopped with error");
            }
        }

        outcome
    }

    async fn drive<F>(&mut self, observe: F) -> Result<(), ServerError>
    where
        F: FnOnce() -> io::Result<Box<dyn SignalObserver>>,
    {
        self.advance(LifecycleState::Starting);

        let address = match self.validated_address() {
            Ok(address) => address,
            Err(e) => {
                self.advance(LifecycleState::Failed);
                return Err(e.into());
            }
        };

        let mut observer = match observe() {
            Ok(observer) => observer,
            Err(e) => {
                self.advance(LifecycleState::Failed);
                return Err(ServerError::Signals(e));
            }
        };

        let timeouts = &self.config.timeouts;
        tracing::info!(
            address = %address,
            read = ?timeouts.read,
            request = ?timeouts.request,
            write = ?timeouts.write,
            "Starting server"
        );

        let (mut handle, mut exit) = listener::start(
            address,
            self.app.clone(),
            ConnectionTimeouts {
                read: timeouts.read,
                write: timeouts.write,
            },
            self.events.clone(),
        );
        self.advance(LifecycleState::Running);

        match wait_running(&mut exit, observer.as_mut()).await {
            Wake::Failed(e) => {
                self.advance(LifecycleState::Failed);
                Err(e.into())
            }
            Wake::Closed => {
                self.advance(LifecycleState::Stopped);
                Ok(())
            }
            Wake::Signal(signal, early_exit) => {
                self.shutdown(signal, observer.as_mut(), &mut handle, exit, early_exit)
                    .await
            }
        }
    }

    async fn shutdown(
        &mut self,
        signal: TerminationSignal,
        observer: &mut dyn SignalObserver,
        handle: &mut ListenerHandle,
        exit: ListenerExit,
        early_exit: Option<Result<(), ListenerError>>,
    ) -> Result<(), ServerError> {
        self.advance(LifecycleState::ShuttingDownGraceful);
        tracing::info!(%signal, "Received termination signal, shutting down");

        observer.disarm(signal);
        handle.shutdown();

        let in_flight_budget = self.config.timeouts.shutdown_in_flight;
        tracing::info!(
            in_flight = handle.in_flight(),
            budget = ?in_flight_budget,
            "Waiting for in-flight requests"
        );

        if let Err(cause) = tokio::time::timeout(in_flight_budget, handle.drained()).await {
            self.advance(LifecycleState::ShuttingDownHard);
            tracing::warn!(
                in_flight = handle.in_flight(),
                budget = ?in_flight_budget,
                "In-flight requests did not finish, forcing close"
            );

            let timeout = ShutdownTimeout {
                budget: in_flight_budget,
                cause,
            };
            return match handle.close().await {
                Ok(()) => {
                    self.advance(LifecycleState::Stopped);
                    Err(ServerError::GracefulTimeout(timeout))
                }
                Err(close) => {
                    self.advance(LifecycleState::Failed);
                    Err(ServerError::HardClose { timeout, close })
                }
            };
        }

        let task_budget = self.config.timeouts.shutdown_task;
        tracing::info!(budget = ?task_budget, "In-flight requests done, waiting for shutdown tasks");
        tokio::time::sleep(task_budget).await;

        let outcome = match early_exit {
            Some(outcome) => outcome,
            None => flatten(exit.await),
        };

        match outcome {
            Ok(()) => {
                self.advance(LifecycleState::Stopped);
                Ok(())
            }
            Err(e) => {
                self.advance(LifecycleState::Failed);
                Err(e.into())
            }
        }
    }

    fn validated_address(&self) -> Result<SocketAddr, ConfigError> {
        validate_config(&self.config)?;
        self.config
            .socket_addr()
            .map_err(|_| ConfigError::from(vec![ValidationError::Address(self.config.address.clone())]))
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal lifecycle transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        self.events.transition(next);
    }
}

/// What ended the `Running` state.
#[derive(Debug)]
enum Wake {
    /// The listener failed; any pending signal is ignored.
    Failed(ListenerError),
    /// The listener closed and no signal was waiting.
    Closed,
    /// A signal arrived, possibly after the listener had already closed.
    Signal(TerminationSignal, Option<Result<(), ListenerError>>),
}

async fn wait_running(exit: &mut ListenerExit, observer: &mut dyn SignalObserver) -> Wake {
    let mut signals_open = true;
    loop {
        tokio::select! {
            biased;

            outcome = &mut *exit => match flatten(outcome) {
                Err(e) => return Wake::Failed(e),
                // Closed with nothing asking for it: only a signal that
                // is already waiting turns this into a shutdown.
                Ok(()) => match observer.recv().now_or_never() {
                    Some(Some(signal)) => return Wake::Signal(signal, Some(Ok(()))),
                    _ => return Wake::Closed,
                },
            },

            received = observer.recv(), if signals_open => match received {
                Some(signal) => return Wake::Signal(signal, None),
                None => {
                    tracing::debug!("Signal source closed, waiting on listener only");
                    signals_open = false;
                }
            },
        }
    }
}

fn flatten(
    outcome: Result<Result<(), ListenerError>, oneshot::error::RecvError>,
) -> Result<(), ListenerError> {
    outcome.unwrap_or(Err(ListenerError::Aborted))
}
