//! Per-request deadline.
//!
//! # Responsibilities
//! - Bound the time a handler may take to produce a response
//! - Answer a late request with `408` and a fixed body
//! - Discard whatever the slow handler would have produced
//!
//! # Design Decisions
//! - The handler future is dropped at the deadline, so late writes have
//!   nowhere to go
//! - Connection read/write guards are enforced by the listener, not here

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};

/// Body of the response sent when a handler runs past its budget.
pub const REQUEST_TIMEOUT_MESSAGE: &str = "Failed to finish request, timed out";

/// Budget for a single handler invocation.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline(pub Duration);

/// Middleware enforcing a [`RequestDeadline`].
pub async fn enforce(
    State(RequestDeadline(budget)): State<RequestDeadline>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, budget = ?budget, "Request timed out");
            timeout_response()
        }
    }
}

/// The fixed timeout response.
pub fn timeout_response() -> Response {
    (
        StatusCode::REQUEST_TIMEOUT,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        REQUEST_TIMEOUT_MESSAGE,
    )
        .into_response()
}

/// Wrap every route of `router` in a deadline of `budget`.
pub fn with_deadline(router: Router, budget: Duration) -> Router {
    router.layer(middleware::from_fn_with_state(RequestDeadline(budget), enforce))
}
