//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method and status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_upstream_errors_total` (counter): failures by kind
//! - `proxy_body_rewrites_total` (counter): body handling outcome
//! - `proxy_active_tunnels` (gauge): open WebSocket tunnels
//!
//! # Design Decisions
//! - Recording is always on; without an installed exporter it is a no-op
//! - Labels never carry hosts or paths, only bounded enums

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

/// Outcome of body handling for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten,
    Unchanged,
    Encoded,
    OversizedPassthrough,
    OversizedRejected,
}

impl RewriteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RewriteOutcome::Rewritten => "rewritten",
            RewriteOutcome::Unchanged => "unchanged",
            RewriteOutcome::Encoded => "encoded",
            RewriteOutcome::OversizedPassthrough => "oversized_passthrough",
            RewriteOutcome::OversizedRejected => "oversized_rejected",
        }
    }
}

pub fn record_body_rewrite(outcome: RewriteOutcome) {
    counter!("proxy_body_rewrites_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn tunnel_opened() {
    gauge!("proxy_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    gauge!("proxy_active_tunnels").decrement(1.0);
}
