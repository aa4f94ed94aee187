//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the upstream target is usable
//! - Validate value ranges (timeouts > 0, body limit > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::rewrite::UpstreamIdentity;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream.target_url is required (set TARGET_URL)")]
    MissingUpstream,

    #[error("upstream.target_url '{url}' is invalid: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("upstream.ip '{0}' is not an IP address")]
    InvalidUpstreamIp(String),

    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.public_host '{0}' is not a valid host")]
    InvalidPublicHost(String),

    #[error("rewrite.public_scheme must be http or https, got '{0}'")]
    InvalidPublicScheme(String),

    #[error("rewrite.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("rewrite.strip_response_headers contains invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = UpstreamIdentity::from_config(&config.upstream) {
        errors.push(e);
    }

    if let Some(ip) = &config.upstream.ip {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidUpstreamIp(ip.clone()));
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(host) = &config.listener.public_host {
        if !crate::rewrite::is_valid_public_host(host) {
            errors.push(ValidationError::InvalidPublicHost(host.clone()));
        }
    }

    let scheme = config.rewrite.public_scheme.as_str();
    if scheme != "http" && scheme != "https" {
        errors.push(ValidationError::InvalidPublicScheme(scheme.to_string()));
    }

    if config.rewrite.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    for name in &config.rewrite.strip_response_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.response_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("response_secs"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
