//! Pre-loaded operational handlers.
//!
//! # Endpoints
//! - `/`, `/liveness`: always `OK`
//! - `/readiness`: `OK`, or 503 with the check's error
//! - `/stop`: request a graceful stop through the signal observer
//! - `/debug/vars`: server info and published vars as JSON
//! - `/metrics`: Prometheus exposition

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::config::{ServerConfig, TimeoutConfig};
use crate::lifecycle::StopHandle;

const OK_BODY: &str = "OK\n";

/// A route registered on the server.
pub struct Handler {
    pub path: String,
    pub route: MethodRouter,
}

impl Handler {
    pub fn new(path: impl Into<String>, route: MethodRouter) -> Self {
        Self {
            path: path.into(),
            route,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("path", &self.path).finish()
    }
}

/// Readiness check supplied by the embedding application.
pub type ReadinessCheck =
    Arc<dyn Fn() -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

fn plain(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn respond_ok() -> Response {
    plain(StatusCode::OK, OK_BODY.to_string())
}

/// `GET` answering `OK`.
pub fn ok() -> MethodRouter {
    get(respond_ok)
}

/// Liveness: the process answering is the whole check.
pub fn liveness() -> MethodRouter {
    get(respond_ok)
}

/// Readiness backed by `check`.
pub fn readiness(check: ReadinessCheck) -> MethodRouter {
    get(move || {
        let check = check.clone();
        async move {
            match check() {
                Ok(()) => plain(StatusCode::OK, OK_BODY.to_string()),
                Err(e) => {
                    tracing::debug!(error = %e, "Readiness check failed");
                    plain(StatusCode::SERVICE_UNAVAILABLE, format!("{}\n", e))
                }
            }
        }
    })
}

/// Remote stop: equivalent to sending the process SIGINT.
pub fn stop(handle: StopHandle) -> MethodRouter {
    get(move || {
        let handle = handle.clone();
        async move {
            tracing::info!("Stop requested over HTTP");
            if !handle.stop() {
                tracing::warn!("Stop requested but the server is not observing signals");
            }
            plain(StatusCode::OK, OK_BODY.to_string())
        }
    })
}

/// Server description published under `/debug/vars`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub address: String,
    pub pid: u32,
    pub timeouts: TimeoutConfig,
    pub enable_metrics: bool,
    pub enable_telemetry: bool,
}

impl ServerInfo {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            pid: std::process::id(),
            timeouts: config.timeouts,
            enable_metrics: config.enable_metrics,
            enable_telemetry: config.enable_telemetry,
        }
    }
}

#[derive(Debug, Serialize)]
struct Vars<'a> {
    server: &'a ServerInfo,
    cmdline: Vec<String>,
    #[serde(flatten)]
    published: &'a BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
struct VarsState {
    server: Arc<ServerInfo>,
    published: Arc<BTreeMap<String, serde_json::Value>>,
}

async fn render_vars(State(state): State<VarsState>) -> Response {
    Json(Vars {
        server: &state.server,
        cmdline: std::env::args().collect(),
        published: &state.published,
    })
    .into_response()
}

/// `/debug/vars`: server info, command line and published vars.
pub fn vars(server: ServerInfo, published: BTreeMap<String, serde_json::Value>) -> MethodRouter {
    get(render_vars).with_state(VarsState {
        server: Arc::new(server),
        published: Arc::new(published),
    })
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// `/metrics`: Prometheus text exposition.
pub fn metrics(handle: PrometheusHandle) -> MethodRouter {
    get(render_metrics).with_state(handle)
}
