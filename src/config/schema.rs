//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root configuration for the identity-hiding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Operating mode. Affects logging and error verbosity only.
    pub mode: Mode,

    /// Listener configuration (bind address, public identity, drain).
    pub listener: ListenerConfig,

    /// The single upstream origin being hidden.
    pub upstream: UpstreamConfig,

    /// Response rewriting settings.
    pub rewrite: RewriteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Operating mode of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Verbose logs and classified error messages.
    #[default]
    Development,
    /// Quiet, structured logs and generic error messages.
    Production,
}

impl Mode {
    /// Whether error detail may be logged and surfaced in error messages.
    pub fn is_verbose(self) -> bool {
        matches!(self, Mode::Development)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!("unknown mode '{}', expected development or production", other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Fixed public host. When unset the Host header of each request is used.
    pub public_host: Option<String>,

    /// Seconds to wait for in-flight requests after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            public_host: None,
            shutdown_grace_secs: 10,
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Target URL, scheme + host [+ port] [+ path prefix]. Required.
    pub target_url: String,

    /// Literal IP address of the origin to scrub from responses.
    pub ip: Option<String>,

    /// Let the transport follow upstream redirects instead of rewriting them.
    pub follow_redirects: bool,

    /// Redirect hop limit when `follow_redirects` is enabled.
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            ip: None,
            follow_redirects: false,
            max_redirects: 5,
        }
    }
}

/// What to do with a textual body larger than `max_body_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Fail the request with a 502.
    #[default]
    Reject,
    /// Stream the original bytes unmodified.
    Passthrough,
}

/// Response rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Rewrite textual bodies. Headers are always sanitized.
    pub enabled: bool,

    /// Scheme used for scheme-qualified public references.
    pub public_scheme: String,

    /// Maximum textual body buffered for rewriting.
    pub max_body_bytes: usize,

    /// Policy once `max_body_bytes` is exceeded.
    pub oversize_policy: OversizePolicy,

    /// Content types whose bodies are rewritten (prefix match, case-insensitive).
    pub textual_content_types: Vec<String>,

    /// Extra response headers removed on top of the built-in set.
    pub strip_response_headers: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            public_scheme: "https".to_string(),
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            oversize_policy: OversizePolicy::Reject,
            textual_content_types: vec![
                "text/html".to_string(),
                "application/javascript".to_string(),
                "text/javascript".to_string(),
                "application/json".to_string(),
            ],
            strip_response_headers: Vec::new(),
        }
    }
}

/// Timeout configuration for upstream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until upstream response headers arrive, in seconds.
    pub response_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            response_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive. `RUST_LOG` takes precedence; defaults depend on mode.
    pub log_level: Option<String>,

    /// Force JSON logs. Defaults to on in production.
    pub json_logs: Option<bool>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            json_logs: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
