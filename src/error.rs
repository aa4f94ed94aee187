//! Per-request error taxonomy and the client-facing error response.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

/// Everything that can go wrong while serving one request.
///
/// All variants are contained at the dispatcher and turned into a JSON
/// response that never carries upstream names or source error text.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream body exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("missing or invalid Host header")]
    InvalidHost,

    #[error("body is not valid UTF-8: {0}")]
    RewriteEncoding(#[from] std::str::Utf8Error),

    #[error("failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl ProxyError {
    /// Wrap a transport error, dropping the URL so it never reaches a log line
    /// or message that could be surfaced.
    pub fn upstream(err: reqwest::Error) -> Self {
        ProxyError::UpstreamUnreachable(err.without_url())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidHost => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::UpstreamUnreachable(e) if e.is_connect() => "connect",
            ProxyError::UpstreamUnreachable(e) if e.is_timeout() => "timeout",
            ProxyError::UpstreamUnreachable(_) => "transport",
            ProxyError::UpstreamTimeout(_) => "timeout",
            ProxyError::BodyTooLarge { .. } => "body_too_large",
            ProxyError::InvalidHost => "invalid_host",
            ProxyError::RewriteEncoding(_) => "encoding",
            ProxyError::Response(_) => "response",
        }
    }

    fn verbose_message(&self) -> &'static str {
        match self.kind() {
            "connect" => "Upstream connection failed",
            "timeout" => "Upstream timed out",
            "body_too_large" => "Upstream response too large to process",
            "invalid_host" => "Missing or invalid Host header",
            _ => "Upstream request failed",
        }
    }

    /// Render the `{"error", "message"}` body.
    ///
    /// `verbose` picks a classified message; otherwise a generic one.
    pub fn into_client_response(self, verbose: bool) -> Response {
        let status = self.status();
        let message = match (&self, verbose) {
            (ProxyError::InvalidHost, _) => self.verbose_message(),
            (_, true) => self.verbose_message(),
            (_, false) => "Unable to reach the service",
        };
        let error = status.canonical_reason().unwrap_or("Bad Gateway");

        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

/// Failures that stop the proxy from starting or keep it from serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build upstream client: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.into_client_response(false)
    }
}
