//! WebSocket passthrough.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Once upstream answers 101, splice the client and upstream connections
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Proxy ←──── raw bytes ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - Only the handshake headers are sanitized; frames pass through untouched
//! - Each tunnel is tracked and closed when shutdown fires

use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, Request};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

use crate::lifecycle::Shutdown;
use crate::net::ConnectionTracker;

/// Whether a request asks to switch to the WebSocket protocol.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    header_has_token(headers, CONNECTION, "upgrade") && header_has_token(headers, UPGRADE, "websocket")
}

fn header_has_token(headers: &HeaderMap, name: axum::http::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Complete both upgrades in the background and copy bytes until either side closes.
pub fn spawn_tunnel(
    client: OnUpgrade,
    upstream: reqwest::Response,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
    request_id: String,
) {
    let guard = tracker.track();
    tokio::spawn(async move {
        let upstream = match upstream.upgrade().await {
            Ok(io) => io,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e.without_url(), "Upstream upgrade failed");
                return;
            }
        };
        let client = match client.await {
            Ok(io) => io,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Client upgrade failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = upstream;
        tracing::debug!(request_id = %request_id, tunnel = %guard.id(), "Tunnel open");

        tokio::select! {
            result = tokio::io::copy_bidirectional(&mut client, &mut upstream) => match result {
                Ok((sent, received)) => tracing::debug!(
                    request_id = %request_id,
                    tunnel = %guard.id(),
                    bytes_sent = sent,
                    bytes_received = received,
                    "Tunnel finished"
                ),
                Err(e) => tracing::debug!(request_id = %request_id, tunnel = %guard.id(), error = %e, "Tunnel closed with error"),
            },
            _ = shutdown.wait() => {
                tracing::debug!(request_id = %request_id, tunnel = %guard.id(), "Closing tunnel for shutdown");
            }
        }
        drop(guard);
    });
}
