//! The fixed upstream origin.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use url::Url;

use crate::config::UpstreamConfig;
use crate::upstream::types::{UpstreamError, UpstreamResult};

/// Immutable description of the origin being proxied. Built once at
/// startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    base: Url,
    default_headers: HeaderMap,
    timeout: Duration,
    max_redirects: usize,
    accept_invalid_certs: bool,
}

impl ProxyTarget {
    /// Build a target from configuration.
    ///
    /// Extra headers that are not valid HTTP header names or values are
    /// skipped with a warning.
    pub fn from_config(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| UpstreamError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in [
            (USER_AGENT, &config.user_agent),
            (ACCEPT, &config.accept),
            (ACCEPT_LANGUAGE, &config.accept_language),
        ] {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    default_headers.insert(name, value);
                }
                Err(_) => tracing::warn!(header = %name, "Ignoring invalid default header value"),
            }
        }
        for (name, value) in &config.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    default_headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Ignoring invalid fixed upstream header"),
            }
        }

        Ok(Self {
            base,
            default_headers,
            timeout: Duration::from_secs(config.timeout_secs),
            max_redirects: config.max_redirects,
            accept_invalid_certs: config.accept_invalid_certs,
        })
    }

    /// Base origin URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Join an inbound path against the base origin using standard
    /// URL-join rules. The path is not normalized beforehand.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    /// True when `url` has the same scheme, host and port as the base.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    /// Path prefix of the base URL, always ending with `/`.
    pub fn path_prefix(&self) -> &str {
        let path = self.base.path();
        match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "/",
        }
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}
