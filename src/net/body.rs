//! Absolute deadlines on request and response bodies.
//!
//! # Responsibilities
//! - Fix one read deadline and one write deadline when a request is dispatched
//! - Fail a request body still being received after the read deadline
//! - Fail a response body still being sent after the write deadline
//!
//! # Design Decisions
//! - Deadlines do not move when a frame arrives, so a trickling peer or a
//!   slow stream cannot stretch them
//! - A body error makes hyper drop the connection; no status is sent

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    BoxError, Router,
};
use http_body::{Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::net::listener::ConnectionTimeouts;

/// Which side of the exchange ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyDirection {
    Request,
    Response,
}

/// Error yielded by a body that outlived its deadline.
#[derive(Debug)]
pub struct BodyTimeout {
    pub direction: BodyDirection,
    pub budget: Duration,
}

impl std::fmt::Display for BodyTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            BodyDirection::Request => write!(f, "Request body not received within {:?}", self.budget),
            BodyDirection::Response => write!(f, "Response body not sent within {:?}", self.budget),
        }
    }
}

impl std::error::Error for BodyTimeout {}

/// A body that errors once a fixed instant has passed.
pub struct DeadlineBody {
    inner: Body,
    deadline: Pin<Box<Sleep>>,
    timeout: Option<BodyTimeout>,
}

impl DeadlineBody {
    pub fn new(inner: Body, started: Instant, budget: Duration, direction: BodyDirection) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(started + budget)),
            timeout: Some(BodyTimeout { direction, budget }),
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        if this.deadline.as_mut().poll(cx).is_ready() {
            // Report once; the body is finished after that.
            return Poll::Ready(this.timeout.take().map(|e| Err(e.into())));
        }

        Pin::new(&mut this.inner).poll_frame(cx).map_err(Into::into)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Middleware wrapping both bodies of every exchange in their deadline.
pub async fn enforce(
    State(timeouts): State<ConnectionTimeouts>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let request = request.map(|body| {
        Body::new(DeadlineBody::new(body, started, timeouts.read, BodyDirection::Request))
    });

    next.run(request).await.map(|body| {
        Body::new(DeadlineBody::new(body, started, timeouts.write, BodyDirection::Response))
    })
}

/// Bound the request and response bodies of every route of `app`.
pub fn with_body_deadlines(app: Router, timeouts: ConnectionTimeouts) -> Router {
    app.layer(middleware::from_fn_with_state(timeouts, enforce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post};
    use tower::ServiceExt;

    fn timeouts() -> ConnectionTimeouts {
        ConnectionTimeouts {
            read: Duration::from_secs(2),
            write: Duration::from_secs(2),
        }
    }

    /// Five chunks, `gap` apart.
    fn trickle(gap: Duration) -> Body {
        let chunks = futures_util::stream::unfold(0u8, move |sent| async move {
            if sent == 5 {
                return None;
            }
            tokio::time::sleep(gap).await;
            Some((Ok::<_, std::io::Error>(Bytes::from_static(b"chunk\n")), sent + 1))
        });
        Body::from_stream(chunks)
    }

    fn app() -> Router {
        let routes = Router::new()
            .route(
                "/stream",
                post(|| async { trickle(Duration::from_millis(900)) }),
            )
            .route(
                "/upload",
                post(|body: Body| async move {
                    match axum::body::to_bytes(body, usize::MAX).await {
                        Ok(bytes) => (StatusCode::OK, bytes.len().to_string()),
                        Err(e) => (StatusCode::REQUEST_TIMEOUT, e.to_string()),
                    }
                }),
            );
        with_body_deadlines(routes, timeouts())
    }

    fn post_request(path: &str, body: Body) -> Request {
        axum::http::Request::post(path).body(body).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_stream_is_cut_at_write_deadline() {
        let started = Instant::now();
        let response = app()
            .oneshot(post_request("/stream", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        let elapsed = started.elapsed();

        let err = body.unwrap_err();
        assert!(err.to_string().contains("Response body not sent"), "{err}");
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_body_is_cut_at_read_deadline() {
        let started = Instant::now();
        let response = app()
            .oneshot(post_request("/upload", trickle(Duration::from_millis(900))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn bodies_within_budget_pass_through() {
        let response = app()
            .oneshot(post_request("/upload", trickle(Duration::from_millis(100))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"30");
    }
}
