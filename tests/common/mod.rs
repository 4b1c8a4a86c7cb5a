//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use webserver::config::TimeoutConfig;
use webserver::lifecycle::StopHandle;
use webserver::{LifecycleEvent, LifecycleState, ServerBuilder, ServerError, SignalMode};

/// A server running in the background.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub stop: StopHandle,
    pub events: broadcast::Receiver<LifecycleEvent>,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait until the controller enters `state`.
    pub async fn wait_for(&mut self, state: LifecycleState) {
        loop {
            match self.events.recv().await {
                Ok(LifecycleEvent::Transition(s)) if s == state => return,
                Ok(_) => {}
                Err(e) => panic!("event stream ended before {}: {}", state, e),
            }
        }
    }
}

/// A builder bound to an ephemeral local port, fed by synthetic signals.
pub fn builder(name: &str) -> ServerBuilder {
    ServerBuilder::new(name, "127.0.0.1:0").signals(SignalMode::Manual)
}

pub fn timeouts(read_ms: u64, request_ms: u64, in_flight_ms: u64, task_ms: u64, write_ms: u64) -> TimeoutConfig {
    TimeoutConfig::new(
        Duration::from_millis(read_ms),
        Duration::from_millis(request_ms),
        Duration::from_millis(in_flight_ms),
        Duration::from_millis(task_ms),
        Duration::from_millis(write_ms),
    )
}

/// Build, start, and wait for the listener to bind.
pub async fn spawn(builder: ServerBuilder) -> RunningServer {
    let server = builder.build().expect("valid test config");
    let stop = server.stop_handle();
    let mut events = server.subscribe();
    let task = tokio::spawn(server.start());

    let addr = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(LifecycleEvent::Listening(addr)) => return addr,
                Ok(_) => {}
                Err(e) => panic!("server never bound: {}", e),
            }
        }
    })
    .await
    .expect("listener bound in time");

    RunningServer {
        addr,
        stop,
        events,
        task,
    }
}

/// HTTP client that never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
