//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, connections, shutdowns)
//! - Install a Prometheus recorder once per process
//! - Render the Prometheus text exposition for `/metrics`
//!
//! # Metrics
//! - `http_requests_total` (counter): total requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_connections_active` (gauge): current connection count
//! - `server_shutdowns_total` (counter): lifecycle outcomes
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Installation failure is logged and never affects the lifecycle

use std::sync::OnceLock;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
///
/// Returns `None` when another recorder owns the process.
pub fn install() -> Option<PrometheusHandle> {
    RECORDER
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install metrics recorder");
                None
            }
        })
        .clone()
}

/// Record a served request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();

    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!("http_request_duration_seconds", "method" => method.to_string()).record(elapsed);
}

/// Publish the number of connections being served.
pub fn set_active_connections(count: u64) {
    metrics::gauge!("http_connections_active").set(count as f64);
}

/// Count a finished lifecycle by outcome ("ok", "listener", "timeout", ...).
pub fn record_shutdown(outcome: &'static str) {
    metrics::counter!("server_shutdowns_total", "outcome" => outcome).increment(1);
}
