//! Per-request dispatch.
//!
//! # Responsibilities
//! - Build the rewrite context for the request
//! - Sanitize and forward the request upstream
//! - Run the response through header and body rewriting
//! - Contain every failure as a JSON error response
//!
//! # Data Flow
//! ```text
//! RECEIVED ──▶ FORWARDING ──▶ UPSTREAM_RESPONDED ──▶ REWRITING ──▶ SENT
//!                  │                  │                              ▲
//!                  └───────▶ ERRORED ◀┘                              │
//!                               └────────────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Textual bodies are buffered while UPSTREAM_RESPONDED, so a body read
//!   failure is still a transport error
//! - In REWRITING headers are sanitized before the body is touched
//! - Dropping the handler future (client gone) drops the upstream stream

use std::pin::Pin;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::{future, stream, Stream, StreamExt};

use crate::config::OversizePolicy;
use crate::error::ProxyError;
use crate::http::request::request_id;
use crate::http::response::{assemble, is_bodiless};
use crate::http::server::AppState;
use crate::http::websocket::{is_upgrade_request, spawn_tunnel};
use crate::observability::metrics::{self, RewriteOutcome};
use crate::rewrite::body::declared_length;
use crate::rewrite::headers::strip_hop_by_hop;
use crate::rewrite::{requested_host, BodyRewriter, Buffered, RewriteContext};

type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Forwarding,
    UpstreamResponded,
    Rewriting,
    Sent,
    Errored,
}

impl DispatchState {
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Received, Forwarding)
                | (Forwarding, UpstreamResponded)
                | (Forwarding, Errored)
                | (UpstreamResponded, Rewriting)
                | (UpstreamResponded, Errored)
                | (Rewriting, Sent)
                | (Errored, Sent)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == DispatchState::Sent
    }
}

/// Tracks one request through its states.
#[derive(Debug)]
pub struct Dispatch<'a> {
    state: DispatchState,
    request_id: &'a str,
}

impl<'a> Dispatch<'a> {
    pub fn new(request_id: &'a str) -> Self {
        Self {
            state: DispatchState::Received,
            request_id,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid dispatch transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(request_id = %self.request_id, from = ?self.state, to = ?next, "Dispatch state");
        self.state = next;
    }

    /// Record a failure. Only the transport states move to ERRORED; a
    /// request rejected while RECEIVED never reached the upstream.
    pub fn fail(&mut self) {
        if self.state.can_transition_to(DispatchState::Errored) {
            self.advance(DispatchState::Errored);
        }
    }

    /// Record that the synthetic error response was written.
    pub fn error_sent(&mut self) {
        if self.state == DispatchState::Errored {
            self.advance(DispatchState::Sent);
        }
    }
}

/// What the response body turned into after UPSTREAM_RESPONDED.
enum Outgoing {
    Empty,
    Stream(UpstreamStream),
    Buffered(Bytes),
    Oversized { prefix: Bytes, rest: UpstreamStream },
}

/// Main proxy handler. Every method and path lands here.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let mut tracker = Dispatch::new(&request_id);
    let response = match dispatch(&state, request, &mut tracker).await {
        Ok(response) => response,
        Err(err) => {
            tracker.fail();
            let verbose = state.mode.is_verbose();
            if !matches!(err, ProxyError::InvalidHost) {
                metrics::record_upstream_error(err.kind());
            }
            if verbose {
                tracing::warn!(request_id = %request_id, kind = err.kind(), error = %err, "Request failed");
            } else {
                tracing::warn!(request_id = %request_id, kind = err.kind(), "Request failed");
            }
            let response = err.into_client_response(verbose);
            tracker.error_sent();
            response
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn dispatch(
    state: &AppState,
    mut request: Request<Body>,
    dispatch: &mut Dispatch<'_>,
) -> Result<Response, ProxyError> {
    let request_id = dispatch.request_id;

    let public_host = match state.public_host.as_deref() {
        Some(host) => host,
        None => requested_host(&request).ok_or(ProxyError::InvalidHost)?,
    };
    let ctx = RewriteContext::new(state.upstream.identity().clone(), public_host, &state.public_scheme)?;

    let upgrade = is_upgrade_request(&request);
    let on_upgrade = upgrade.then(|| hyper::upgrade::on(&mut request));

    let (parts, body) = request.into_parts();
    let mut outbound = parts.headers;
    state.request_sanitizer.sanitize(&ctx, &mut outbound, upgrade);

    dispatch.advance(DispatchState::Forwarding);
    let mut upstream = state
        .upstream
        .forward(parts.method.clone(), &parts.uri, outbound, body)
        .await?;
    dispatch.advance(DispatchState::UpstreamResponded);

    let status = upstream.status();
    let mut headers = std::mem::take(upstream.headers_mut());

    if status == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(on_upgrade) = on_upgrade {
            dispatch.advance(DispatchState::Rewriting);
            state.header_sanitizer.sanitize(&ctx, &mut headers);
            strip_hop_by_hop(&mut headers, true);
            spawn_tunnel(
                on_upgrade,
                upstream,
                state.tunnels.clone(),
                state.shutdown.clone(),
                request_id.to_string(),
            );
            let response = assemble(status, headers, Body::empty())?;
            dispatch.advance(DispatchState::Sent);
            return Ok(response);
        }
    }

    let outgoing = if is_bodiless(&parts.method, status) {
        Outgoing::Empty
    } else if !state.body_rewriter.is_textual(&headers) {
        Outgoing::Stream(Box::pin(upstream.bytes_stream()))
    } else if BodyRewriter::is_encoded(&headers) {
        tracing::warn!(
            request_id = %request_id,
            "Textual response is content-encoded; streaming it without rewriting"
        );
        metrics::record_body_rewrite(RewriteOutcome::Encoded);
        Outgoing::Stream(Box::pin(upstream.bytes_stream()))
    } else {
        let stream: UpstreamStream = Box::pin(upstream.bytes_stream());
        match state.body_rewriter.buffer(declared_length(&headers), stream).await {
            Ok(Buffered::Complete(bytes)) => Outgoing::Buffered(bytes),
            Ok(Buffered::Oversized { prefix, rest }) => match state.body_rewriter.oversize_policy() {
                OversizePolicy::Reject => {
                    metrics::record_body_rewrite(RewriteOutcome::OversizedRejected);
                    return Err(ProxyError::BodyTooLarge {
                        limit: state.body_rewriter.max_body_bytes(),
                    });
                }
                OversizePolicy::Passthrough => {
                    tracing::warn!(
                        request_id = %request_id,
                        limit = state.body_rewriter.max_body_bytes(),
                        "Textual body exceeds rewrite limit; passing it through unmodified"
                    );
                    metrics::record_body_rewrite(RewriteOutcome::OversizedPassthrough);
                    Outgoing::Oversized { prefix, rest }
                }
            },
            Err(e) => return Err(ProxyError::upstream(e)),
        }
    };

    dispatch.advance(DispatchState::Rewriting);
    state.header_sanitizer.sanitize(&ctx, &mut headers);
    strip_hop_by_hop(&mut headers, false);

    let body = match outgoing {
        Outgoing::Empty => Body::empty(),
        Outgoing::Stream(stream) => Body::from_stream(stream),
        Outgoing::Buffered(original) => {
            let rewritten = state.body_rewriter.rewrite(&ctx, original.clone());
            let outcome = if rewritten == original {
                RewriteOutcome::Unchanged
            } else {
                RewriteOutcome::Rewritten
            };
            metrics::record_body_rewrite(outcome);
            BodyRewriter::reframe(&mut headers, rewritten.len());
            Body::from(rewritten)
        }
        Outgoing::Oversized { prefix, rest } => {
            let head = stream::once(future::ready(Ok::<_, reqwest::Error>(prefix)));
            Body::from_stream(head.chain(rest))
        }
    };

    let response = assemble(status, headers, body)?;
    dispatch.advance(DispatchState::Sent);
    Ok(response)
}
