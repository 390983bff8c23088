//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Cross-field checks (request deadline outlives the upstream timeout)
//! - Check the upstream base URL is something we can join paths against
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("upstream.base_url '{url}' is invalid: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error(
        "listener.request_timeout_secs ({listener}) must exceed upstream.timeout_secs ({upstream})"
    )]
    TimeoutOrder { listener: u64, upstream: u64 },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("listener.request_timeout_secs"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            errors.push(ValidationError::BaseUrl {
                url: config.upstream.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url) => {
            if !url.path().ends_with('/') {
                tracing::warn!(
                    base_url = %url,
                    "upstream.base_url does not end with '/'; its last path segment is replaced when joining"
                );
            }
        }
        Err(e) => errors.push(ValidationError::BaseUrl {
            url: config.upstream.base_url.clone(),
            reason: e.to_string(),
        }),
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.timeout_secs"));
    }
    // An upstream timeout must surface as 502 before the request deadline.
    let (listener, upstream) = (
        config.listener.request_timeout_secs,
        config.upstream.timeout_secs,
    );
    if listener > 0 && upstream > 0 && listener <= upstream {
        errors.push(ValidationError::TimeoutOrder { listener, upstream });
    }

    if config.analyzer.max_endpoints == 0 {
        errors.push(ValidationError::Zero("analyzer.max_endpoints"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
