//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the origin proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// The single upstream origin and how to talk to it.
    pub upstream: UpstreamConfig,

    /// Disk cache used by the `/fetch` endpoint.
    pub cache: CacheConfig,

    /// Site analyzer settings.
    pub analyzer: AnalyzerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Total time allowed for handling one inbound request, in seconds.
    pub request_timeout_secs: u64,

    /// Largest inbound body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 60,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ListenerConfig {
    /// Replace the port of the bind address, keeping the host part.
    ///
    /// Falls back to `0.0.0.0:<port>` when the current address does not parse.
    pub fn set_port(&mut self, port: u16) {
        let addr = match self.bind_address.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr
            }
            Err(_) => SocketAddr::from(([0, 0, 0, 0], port)),
        };
        self.bind_address = addr.to_string();
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base origin URL (scheme, host and path prefix). Inbound paths are
    /// joined against it, so it should normally end with `/`.
    pub base_url: String,

    /// Default `User-Agent` sent upstream.
    pub user_agent: String,

    /// Default `Accept` sent upstream.
    pub accept: String,

    /// Default `Accept-Language` sent upstream.
    pub accept_language: String,

    /// Extra fixed headers applied to every upstream call.
    pub headers: BTreeMap<String, String>,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum number of redirects followed per call.
    pub max_redirects: usize,

    /// Skip TLS certificate verification. Only for origins with broken
    /// certificates; must be opted into explicitly.
    pub accept_invalid_certs: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
            headers: BTreeMap::new(),
            timeout_secs: 30,
            max_redirects: 10,
            accept_invalid_certs: false,
        }
    }
}

/// Disk cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one file per cache key.
    pub dir: String,

    /// Entries older than this are treated as misses.
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: "cache".to_string(),
            max_age_secs: 3600,
        }
    }
}

/// Site analyzer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Cap on candidate endpoint strings reported per analysis.
    pub max_endpoints: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { max_endpoints: 50 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
