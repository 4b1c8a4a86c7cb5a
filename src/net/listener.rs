//! Network listener process.
//!
//! # Responsibilities
//! - Bind the configured address from inside its own task
//! - Accept TCP connections and serve them (HTTP/1.1 and HTTP/2)
//! - Enforce the read and write guards at the connection level
//! - Stop accepting and drain on request, abort every connection on close
//! - Report exactly one terminal outcome
//!
//! # Design Decisions
//! - Launch is fire-and-forget: a bind failure arrives on the exit channel
//!   like any other serve error
//! - The serve task never initiates shutdown; only the handle does
//! - Connections live in a `JoinSet` so a hard close can abort them all

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::Instrument;

use crate::lifecycle::LifecycleEvents;
use crate::net::body::with_body_deadlines;
use crate::net::connection::ConnectionTracker;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Accepting failed in a way that is not specific to one connection.
    Accept(std::io::Error),
    /// The serve task ended without reporting an outcome.
    Aborted,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Aborted => write!(f, "Listener task exited without an outcome"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Aborted => None,
        }
    }
}

/// Error returned when a forced close could not be completed.
#[derive(Debug)]
pub enum CloseError {
    /// The serve task panicked or was cancelled while closing.
    Join(JoinError),
    /// The listener was already closed.
    AlreadyClosed,
}

impl std::fmt::Display for CloseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseError::Join(e) => write!(f, "Serve task failed while closing: {}", e),
            CloseError::AlreadyClosed => write!(f, "Listener already closed"),
        }
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CloseError::Join(e) => Some(e),
            CloseError::AlreadyClosed => None,
        }
    }
}

/// The single terminal outcome of a serve task.
///
/// `Ok(())` is the "closed" result of a requested shutdown.
pub type ListenerExit = oneshot::Receiver<Result<(), ListenerError>>;

/// Connection-level guards, separate from the per-request deadline.
///
/// Both body deadlines are fixed when the request is dispatched and do not
/// move as frames arrive.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    /// Max time to read the request headers, and to receive the whole
    /// request body.
    pub read: Duration,
    /// Max time to send the whole response body.
    pub write: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Serve,
    Drain,
    Close,
}

/// Launch the serve task and return its handle and exit channel.
///
/// Does not wait for the bind; must be called inside a Tokio runtime.
pub fn start(
    address: SocketAddr,
    app: Router,
    timeouts: ConnectionTimeouts,
    events: LifecycleEvents,
) -> (ListenerHandle, ListenerExit) {
    let (control_tx, control_rx) = watch::channel(Control::Serve);
    let (drained_tx, drained_rx) = watch::channel(false);
    let (exit_tx, exit_rx) = oneshot::channel();
    let tracker = ConnectionTracker::new();

    let app = with_body_deadlines(app, timeouts);

    let serve = ServeLoop {
        address,
        app,
        header_read_timeout: timeouts.read,
        control: control_rx,
        drained: drained_tx,
        tracker: tracker.clone(),
        events,
    };

    let serve_task = async move {
        let outcome = serve.run().await;
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "Listener stopped");
        }
        let _ = exit_tx.send(outcome);
    };
    let task = tokio::spawn(serve_task.in_current_span());

    let handle = ListenerHandle {
        control: control_tx,
        drained: drained_rx,
        tracker,
        task: Some(task),
    };
    (handle, exit_rx)
}

/// Exclusive control over a running serve task.
///
/// Dropping the handle aborts the task.
#[derive(Debug)]
pub struct ListenerHandle {
    control: watch::Sender<Control>,
    drained: watch::Receiver<bool>,
    tracker: ConnectionTracker,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop accepting connections and ask open ones to finish, disabling
    /// keep-alive so idle connections close promptly.
    ///
    /// Only the first call has an effect; it returns true.
    pub fn shutdown(&self) -> bool {
        self.control.send_if_modified(|control| {
            if *control == Control::Serve {
                *control = Control::Drain;
                true
            } else {
                false
            }
        })
    }

    /// Resolve once every connection has finished after [`shutdown`](Self::shutdown),
    /// or once the serve task has exited.
    pub async fn drained(&mut self) {
        let _ = self.drained.wait_for(|drained| *drained).await;
    }

    /// Number of connections still being served.
    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Abort every connection and wait for the serve task to exit.
    pub async fn close(&mut self) -> Result<(), CloseError> {
        self.control.send_replace(Control::Close);
        let task = self.task.take().ok_or(CloseError::AlreadyClosed)?;
        task.await.map_err(CloseError::Join)
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ServeLoop {
    address: SocketAddr,
    app: Router,
    header_read_timeout: Duration,
    control: watch::Receiver<Control>,
    drained: watch::Sender<bool>,
    tracker: ConnectionTracker,
    events: LifecycleEvents,
}

impl ServeLoop {
    async fn run(mut self) -> Result<(), ListenerError> {
        let listener = TcpListener::bind(self.address)
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");
        self.events.listening(local_addr);

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.header_read_timeout);

        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.spawn_connection(&builder, &graceful, &mut connections, stream, peer);
                    }
                    Err(e) if is_connection_error(&e) => {
                        tracing::debug!(error = %e, "Accept error, skipping connection");
                    }
                    Err(e) => return Err(ListenerError::Accept(e)),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                changed = self.control.changed() => {
                    if changed.is_err() || *self.control.borrow() != Control::Serve {
                        break;
                    }
                }
            }
        }

        // New connection attempts are refused from here on.
        drop(listener);

        tracing::info!(
            in_flight = self.tracker.active_count(),
            "Listener closed, keep-alive disabled, draining connections"
        );

        let drained = tokio::select! {
            _ = graceful.shutdown() => true,
            _ = self.control.wait_for(|control| *control == Control::Close) => false,
        };

        if drained {
            while connections.join_next().await.is_some() {}
            let _ = self.drained.send(true);
            tracing::debug!("All connections drained");
        } else {
            let aborted = connections.len();
            connections.shutdown().await;
            tracing::warn!(aborted, "Connections aborted");
        }

        Ok(())
    }

    fn spawn_connection(
        &self,
        builder: &Builder<TokioExecutor>,
        graceful: &GracefulShutdown,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let guard = self.tracker.track();
        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(self.app.clone());
        let builder = builder.clone();
        let watcher = graceful.watcher();

        tracing::trace!(connection_id = %guard.id(), peer_addr = %peer, "Connection accepted");

        let serve_connection = async move {
            let conn = builder.serve_connection_with_upgrades(io, service);
            if let Err(e) = watcher.watch(conn).await {
                tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, error = %e, "Connection error");
            }
            drop(guard);
        };
        connections.spawn(serve_connection.in_current_span());
    }
}

/// Errors that concern a single incoming connection, not the listener.
fn is_connection_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::lifecycle::LifecycleEvent;

    fn timeouts() -> ConnectionTimeouts {
        ConnectionTimeouts {
            read: Duration::from_secs(2),
            write: Duration::from_secs(2),
        }
    }

    async fn listening(rx: &mut tokio::sync::broadcast::Receiver<LifecycleEvent>) -> SocketAddr {
        loop {
            if let LifecycleEvent::Listening(addr) = rx.recv().await.unwrap() {
                return addr;
            }
        }
    }

    async fn get_raw(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn bind_failure_is_reported_on_exit_channel() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let (_handle, exit) = start(addr, Router::new(), timeouts(), LifecycleEvents::new());

        match exit.await.unwrap() {
            Err(ListenerError::Bind(_)) => {}
            other => panic!("expected bind error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn drains_then_reports_closed() {
        let events = LifecycleEvents::new();
        let mut rx = events.subscribe();
        let app = Router::new().route("/", get(|| async { "hello" }));

        let (mut handle, exit) = start("127.0.0.1:0".parse().unwrap(), app, timeouts(), events);
        let addr = listening(&mut rx).await;

        assert!(get_raw(addr, "/").await.ends_with("hello"));

        assert!(handle.shutdown());
        assert!(!handle.shutdown());
        handle.drained().await;

        assert!(exit.await.unwrap().is_ok());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn close_aborts_in_flight_connections() {
        let events = LifecycleEvents::new();
        let mut rx = events.subscribe();
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );

        let (mut handle, exit) = start("127.0.0.1:0".parse().unwrap(), app, timeouts(), events);
        let addr = listening(&mut rx).await;

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /slow HTTP/1.1\r\nHost: test\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            let _ = stream.read_to_end(&mut response).await;
            String::from_utf8_lossy(&response).into_owned()
        });
        while handle.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        handle.shutdown();
        let drain = tokio::time::timeout(Duration::from_millis(200), handle.drained()).await;
        assert!(drain.is_err(), "slow request should still be in flight");

        let started = Instant::now();
        handle.close().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(handle.in_flight(), 0);
        assert!(matches!(handle.close().await, Err(CloseError::AlreadyClosed)));

        assert!(exit.await.unwrap().is_ok());
        assert!(!client.await.unwrap().contains("late"));
    }
}
