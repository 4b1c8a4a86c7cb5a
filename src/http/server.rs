//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Collect configuration, handlers and published vars (builder)
//! - Register the pre-loaded operational handlers
//! - Wire up middleware (deadline, access log, tracing, request ID)
//! - Hand the composed router to the lifecycle controller
//!
//! # Middleware order (outermost first)
//! ```text
//! set x-request-id → trace span → propagate x-request-id
//!     → access log → request deadline → handler
//! ```

use std::collections::BTreeMap;

use axum::{middleware, Router};
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, Span};

use crate::config::{validation::validate_config, ConfigError, LoggingConfig, ServerConfig, TimeoutConfig};
use crate::error::ServerError;
use crate::http::deadline;
use crate::http::handlers::{self, Handler, ReadinessCheck, ServerInfo};
use crate::lifecycle::{
    stop_channel, Lifecycle, LifecycleEvent, LifecycleEvents, SignalMode, StopHandle, StopRequests,
};
use crate::observability::access::{access_log, AccessLog};
use crate::observability::metrics;

/// Builder for a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    handlers: Vec<Handler>,
    preload: bool,
    readiness: Option<ReadinessCheck>,
    vars: BTreeMap<String, serde_json::Value>,
    signals: SignalMode,
}

impl ServerBuilder {
    /// Full-featured server: metrics, telemetry and pre-loaded handlers.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self::from_config(ServerConfig::new(name, address))
    }

    /// Bare server: no metrics, no telemetry, no pre-loaded handlers.
    pub fn basic(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(name, address)
            .without_metrics()
            .without_telemetry()
            .without_preloaded_handlers()
    }

    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            preload: true,
            readiness: None,
            vars: BTreeMap::new(),
            signals: SignalMode::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    pub fn without_metrics(mut self) -> Self {
        self.config.enable_metrics = false;
        self
    }

    pub fn without_telemetry(mut self) -> Self {
        self.config.enable_telemetry = false;
        self
    }

    /// Skip `/`, `/liveness` and `/stop`.
    pub fn without_preloaded_handlers(mut self) -> Self {
        self.preload = false;
        self
    }

    /// Register a handler.
    ///
    /// Registering the same path twice, or a path taken by a pre-loaded
    /// handler, panics at [`build`](Self::build).
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(mut self, handlers: impl IntoIterator<Item = Handler>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Serve `/readiness` backed by `check`.
    pub fn readiness(mut self, check: ReadinessCheck) -> Self {
        self.readiness = Some(check);
        self
    }

    /// Publish a value under `/debug/vars`.
    pub fn var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn signals(mut self, mode: SignalMode) -> Self {
        self.signals = mode;
        self
    }

    pub fn build(self) -> Result<Server, ConfigError> {
        validate_config(&self.config)?;

        let config = self.config;
        let span = tracing::info_span!("server", name = %config.name);
        let (stop, requests) = stop_channel();

        let mut router = Router::new();

        if self.preload {
            router = router
                .route("/", handlers::ok())
                .route("/liveness", handlers::liveness())
                .route("/stop", handlers::stop(stop.clone()));
        }

        if let Some(check) = self.readiness {
            router = router.route("/readiness", handlers::readiness(check));
        }

        if config.enable_metrics {
            router = router.route(
                "/debug/vars",
                handlers::vars(ServerInfo::from_config(&config), self.vars),
            );

            match metrics::install() {
                Some(handle) => router = router.route("/metrics", handlers::metrics(handle)),
                None => span.in_scope(|| tracing::warn!("Metrics recorder unavailable, /metrics disabled")),
            }
        }

        for handler in self.handlers {
            router = router.route(&handler.path, handler.route);
        }

        Ok(Server {
            config,
            router,
            span,
            signals: self.signals,
            stop,
            requests,
            events: LifecycleEvents::new(),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::from_config(ServerConfig::default())
    }
}

/// An HTTP server with a single-use lifecycle.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
    span: Span,
    signals: SignalMode,
    stop: StopHandle,
    requests: StopRequests,
    events: LifecycleEvents,
}

impl Server {
    /// Create a full-featured server with default timeouts.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Result<Self, ConfigError> {
        ServerBuilder::new(name, address).build()
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The registered routes, without middleware.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Add or transform routes after construction.
    pub fn map_router(mut self, f: impl FnOnce(Router) -> Router) -> Self {
        self.router = f(self.router);
        self
    }

    /// The span every lifecycle log line is recorded in.
    pub fn logger(&self) -> &Span {
        &self.span
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Observe state transitions and the bound address.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Request a graceful stop, as `/stop` and SIGINT do.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run until the lifecycle reaches a terminal state.
    pub async fn start(self) -> Result<(), ServerError> {
        let Server {
            config,
            router,
            span,
            signals,
            requests,
            events,
            ..
        } = self;

        let app = compose(&config, router);
        Lifecycle::new(config, app, events)
            .run(move || signals.observe(requests))
            .instrument(span)
            .await
    }
}

fn compose(config: &ServerConfig, router: Router) -> Router {
    let app = deadline::with_deadline(router, config.timeouts.request).layer(
        middleware::from_fn_with_state(
            AccessLog {
                record_metrics: config.enable_metrics,
            },
            access_log,
        ),
    );

    if !config.enable_telemetry {
        return app;
    }

    app.layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
