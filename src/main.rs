//! Identity-hiding reverse proxy.
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────┐
//!                      │                   ORIGIN SHIELD                    │
//!   Client Request     │  ┌──────────┐   ┌────────────┐   ┌────────────┐  │
//!   ───────────────────┼─▶│  server  │──▶│ dispatcher │──▶│  request   │──┼──▶ Upstream
//!                      │  │ (axum)   │   │  (states)  │   │ sanitizer  │  │
//!                      │  └──────────┘   └────────────┘   └────────────┘  │
//!                      │                                                   │
//!   Client Response    │  ┌──────────┐   ┌────────────┐   ┌────────────┐  │
//!   ◀──────────────────┼──│   body   │◀──│  header    │◀──│  upstream  │◀─┼─── Upstream
//!                      │  │ rewriter │   │ sanitizer  │   │ transport  │  │
//!                      │  └──────────┘   └────────────┘   └────────────┘  │
//!                      └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use origin_shield::config::{loader, ConfigOverrides, Mode};
use origin_shield::lifecycle::signals;
use origin_shield::observability::{logging, metrics};
use origin_shield::ProxyServer;

/// Forward traffic to one origin without revealing its hostname or IP.
#[derive(Debug, Parser)]
#[command(name = "origin-shield", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream origin URL (scheme + host [+ port] [+ path]).
    #[arg(long, env = "TARGET_URL")]
    target_url: Option<String>,

    /// Literal IP of the origin to scrub from responses.
    #[arg(long, env = "UPSTREAM_IP")]
    upstream_ip: Option<String>,

    /// Listening port.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// development or production.
    #[arg(long, env = "PROXY_MODE")]
    mode: Option<Mode>,

    /// Fixed public host instead of the request's Host header.
    #[arg(long, env = "PUBLIC_HOST")]
    public_host: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target_url: self.target_url.clone(),
            upstream_ip: self.upstream_ip.clone(),
            port: self.port,
            mode: self.mode,
            public_host: self.public_host.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match loader::load(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("origin-shield: configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config) {
        eprintln!("origin-shield: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), mode = %config.mode, "origin-shield starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = match ProxyServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start proxy");
            return ExitCode::FAILURE;
        }
    };

    signals::spawn_signal_handler(server.shutdown_handle());

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Proxy terminated with an error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
