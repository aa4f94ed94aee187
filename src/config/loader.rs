//! Configuration loading from disk and the environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Mode, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values taken from CLI flags or environment variables.
///
/// Anything set here wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target_url: Option<String>,
    pub upstream_ip: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<Mode>,
    pub public_host: Option<String>,
}

impl ConfigOverrides {
    /// Apply the overrides on top of a parsed config.
    pub fn apply(&self, config: &mut ProxyConfig) {
        if let Some(url) = &self.target_url {
            config.upstream.target_url = url.clone();
        }
        if let Some(ip) = &self.upstream_ip {
            config.upstream.ip = Some(ip.clone());
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(host) = &self.public_host {
            config.listener.public_host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{}", port),
            };
        }
    }
}

/// Build the process configuration: file (if any), then overrides, then validation.
pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
