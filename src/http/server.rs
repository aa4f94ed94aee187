//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Bind the listener and serve until shutdown
//! - Drain in-flight requests and tunnels within the grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, Mode, ProxyConfig};
use crate::error::StartupError;
use crate::http::dispatcher::proxy_handler;
use crate::http::request::{MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::upstream::UpstreamClient;
use crate::lifecycle::Shutdown;
use crate::net::ConnectionTracker;
use crate::rewrite::{BodyRewriter, HeaderSanitizer, RequestSanitizer, UpstreamIdentity};

/// Application state injected into the handler.
///
/// Everything here is immutable after startup or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamClient,
    pub request_sanitizer: Arc<RequestSanitizer>,
    pub header_sanitizer: Arc<HeaderSanitizer>,
    pub body_rewriter: Arc<BodyRewriter>,
    pub public_host: Option<Arc<str>>,
    pub public_scheme: Arc<str>,
    pub mode: Mode,
    pub tunnels: ConnectionTracker,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(config: &ProxyConfig, upstream: UpstreamClient, shutdown: Shutdown) -> Self {
        Self {
            upstream,
            request_sanitizer: Arc::new(RequestSanitizer::new(config.rewrite.enabled)),
            header_sanitizer: Arc::new(HeaderSanitizer::new(&config.rewrite.strip_response_headers)),
            body_rewriter: Arc::new(BodyRewriter::new(&config.rewrite)),
            public_host: config.listener.public_host.as_deref().map(Arc::from),
            public_scheme: Arc::from(config.rewrite.public_scheme.as_str()),
            mode: config.mode,
            tunnels: ConnectionTracker::new(),
            shutdown,
        }
    }
}

/// The identity-hiding proxy, bound and ready to serve.
pub struct ProxyServer {
    listener: TcpListener,
    router: Router,
    shutdown: Shutdown,
    tunnels: ConnectionTracker,
    grace: Duration,
}

impl ProxyServer {
    /// Validate the config, build shared state and bind the listener.
    pub async fn bind(config: ProxyConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let identity = UpstreamIdentity::from_config(&config.upstream)
            .map_err(|e| ConfigError::Validation(vec![e]))?;
        let upstream = UpstreamClient::new(&config, Arc::new(identity))?;

        let shutdown = Shutdown::new();
        let state = AppState::new(&config, upstream, shutdown.clone());
        let tunnels = state.tunnels.clone();
        let router = Self::build_router(state);

        let address = config.listener.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;

        tracing::info!(
            mode = %config.mode,
            max_body_bytes = config.rewrite.max_body_bytes,
            oversize_policy = ?config.rewrite.oversize_policy,
            pinned_public_host = config.listener.public_host.is_some(),
            "Proxy configured"
        );

        Ok(Self {
            listener,
            router,
            shutdown,
            tunnels,
            grace: Duration::from_secs(config.listener.shutdown_grace_secs),
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run top to bottom on the way in: the request ID is assigned
    /// before the trace span opens, and copied onto the response last.
    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID));

        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle that stops the server when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown is triggered, then drain.
    pub async fn run(self) -> Result<(), StartupError> {
        let ProxyServer {
            listener,
            router,
            shutdown,
            tunnels,
            grace,
        } = self;

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy server listening");

        let signal = shutdown.clone();
        let mut serve = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.wait().await })
                .await
        });

        tokio::select! {
            result = &mut serve => {
                result.map_err(std::io::Error::other)??;
                tracing::info!("Proxy server stopped");
                return Ok(());
            }
            _ = shutdown.wait() => {}
        }

        tracing::info!(
            grace_secs = grace.as_secs(),
            open_tunnels = tunnels.active_count(),
            "Shutting down, draining in-flight work"
        );

        let drain = async {
            let served = (&mut serve).await;
            tunnels.wait_for_drain().await;
            served
        };
        let outcome = tokio::time::timeout(grace, drain).await;

        match outcome {
            Ok(served) => served.map_err(std::io::Error::other)??,
            Err(_) => {
                tracing::warn!(
                    open_tunnels = tunnels.active_count(),
                    "Grace period elapsed, aborting remaining connections"
                );
                serve.abort();
            }
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}
