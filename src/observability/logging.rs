//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the config file, which wins over the mode default

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Mode, ProxyConfig};

/// Default filter directive for a mode.
pub fn default_directive(mode: Mode) -> &'static str {
    match mode {
        Mode::Development => "origin_shield=debug,tower_http=debug",
        Mode::Production => "origin_shield=info",
    }
}

/// Build the filter: `RUST_LOG`, then `observability.log_level`, then the mode default.
pub fn env_filter(config: &ProxyConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = config
            .observability
            .log_level
            .as_deref()
            .unwrap_or_else(|| default_directive(config.mode));
        EnvFilter::new(directive)
    })
}

/// Whether events are emitted as JSON lines.
pub fn use_json(config: &ProxyConfig) -> bool {
    config
        .observability
        .json_logs
        .unwrap_or(config.mode == Mode::Production)
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(config: &ProxyConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    if use_json(config) {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().pretty()).try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_defaults_to_json() {
        let mut config = ProxyConfig::default();
        assert!(!use_json(&config));

        config.mode = Mode::Production;
        assert!(use_json(&config));

        config.observability.json_logs = Some(false);
        assert!(!use_json(&config));
    }

    #[test]
    fn mode_picks_default_directive() {
        assert!(default_directive(Mode::Development).contains("debug"));
        assert_eq!(default_directive(Mode::Production), "origin_shield=info");
    }
}
