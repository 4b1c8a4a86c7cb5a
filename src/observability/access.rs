//! Per-request access log.
//!
//! One line per request at target `webserver::access`, filtered by the
//! configured request level. Request metrics are recorded alongside when
//! the server has metrics enabled.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::observability::metrics;

/// Whether the access log also records request metrics.
#[derive(Debug, Clone, Copy)]
pub struct AccessLog {
    pub record_metrics: bool,
}

/// Log the request once its response head is ready.
pub async fn access_log(State(log): State<AccessLog>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let status = response.status().as_u16();

    tracing::info!(
        target: "webserver::access",
        method = %method,
        path = %path,
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "request"
    );

    if log.record_metrics {
        metrics::record_request(method.as_str(), status, start);
    }

    response
}
