//! Origin proxy server.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                ORIGIN PROXY                  │
//!                        │                                              │
//!   Client Request       │  ┌─────────┐    ┌────────────┐               │
//!   ─────────────────────┼─▶│  http   │───▶│  request   │──┐            │
//!                        │  │ server  │    │ translator │  │            │
//!                        │  └─────────┘    └────────────┘  ▼            │
//!                        │       │                  ┌────────────┐      │
//!                        │       │ /fetch           │  upstream  │──────┼──▶ Origin
//!                        │       └──────▶ cache ───▶│   client   │◀─────┼───
//!                        │                          └────────────┘      │
//!   Client Response      │  ┌──────────┐    ┌────────────┐   │          │
//!   ◀────────────────────┼──│ rewrite  │◀───│  response  │◀──┘          │
//!                        │  │ (/view)  │    │ translator │              │
//!                        │  └──────────┘    └────────────┘              │
//!                        │                                              │
//!                        │  analyzer (/analyze, /news), config,         │
//!                        │  observability, lifecycle                    │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use origin_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use origin_proxy::lifecycle::{signals, Shutdown};
use origin_proxy::observability::{logging, metrics};
use origin_proxy::HttpServer;

/// Reverse proxy for a single upstream origin.
#[derive(Debug, Parser)]
#[command(name = "origin-proxy", version, about)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, replacing the port of `listener.bind_address`.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Upstream base URL, replacing `upstream.base_url`.
    #[arg(short, long, env = "UPSTREAM_URL")]
    upstream: Option<String>,
}

fn resolve_config(args: &Args) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(port) = args.port {
        config.listener.set_port(port);
    }
    if let Some(upstream) = &args.upstream {
        config.upstream.base_url = upstream.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "origin-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        cache_dir = %config.cache.dir,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args::parse_from([
            "origin-proxy",
            "--port",
            "9001",
            "--upstream",
            "https://jw.example.edu/jsxsd/",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9001");
        assert_eq!(config.upstream.base_url, "https://jw.example.edu/jsxsd/");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = Args::parse_from(["origin-proxy", "--upstream", "ftp://files.example/"]);
        assert!(matches!(resolve_config(&args), Err(ConfigError::Validation(_))));
    }
}
