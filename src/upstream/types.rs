//! Upstream request/response types and error definitions.

use std::collections::BTreeMap;
use std::fmt;

use axum::body::Bytes;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

/// Body of an outbound request, already decoded according to the inbound
/// declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyBody {
    /// No body is sent.
    Empty,
    /// Re-encoded as `application/json`.
    Json(serde_json::Value),
    /// Re-encoded as `application/x-www-form-urlencoded`.
    Form(BTreeMap<String, String>),
    /// Forwarded byte-for-byte.
    Raw(Bytes),
}

/// One outbound call against the upstream origin.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Fully resolved target URL (base origin joined with the inbound path).
    pub url: Url,
    pub query: Vec<(String, String)>,
    /// Inbound headers minus the hop-specific ones.
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

impl ProxyRequest {
    /// A bare GET with no query, extra headers or body.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: ProxyBody::Empty,
        }
    }
}

/// What came back from the origin, body fully read and decoded.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// URL after redirects.
    pub url: Url,
}

impl UpstreamResponse {
    /// Encoding named by the `charset` parameter of `Content-Type`,
    /// UTF-8 when absent or unknown.
    pub fn encoding(&self) -> &'static Encoding {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_label)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8)
    }

    /// Body decoded with the declared charset. A BOM overrides the header;
    /// malformed sequences become U+FFFD.
    pub fn text(&self) -> String {
        let (text, _, _) = self.encoding().decode(&self.body);
        text.into_owned()
    }
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Why the origin could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Dns,
    Tls,
    Connect,
    /// Anything else on the wire: malformed response, redirect loop, body
    /// read failure.
    Protocol,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Dns => "dns",
            FailureKind::Tls => "tls",
            FailureKind::Connect => "connect",
            FailureKind::Protocol => "protocol",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while talking to the upstream origin.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection refused, DNS failure, timeout, TLS handshake failure or a
    /// broken response.
    #[error("upstream unreachable ({kind}): {message}")]
    Unreachable { kind: FailureKind, message: String },

    /// The client was closed during shutdown.
    #[error("upstream client is closed")]
    Closed,

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Build(String),

    /// The base origin URL does not parse.
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

impl UpstreamError {
    /// Classify a reqwest error by inspecting its flags and source chain.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        let lower = message.to_lowercase();

        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if lower.contains("dns")
            || lower.contains("resolve")
            || lower.contains("lookup")
            || lower.contains("name or service not known")
        {
            FailureKind::Dns
        } else if lower.contains("tls")
            || lower.contains("ssl")
            || lower.contains("certificate")
            || lower.contains("handshake")
        {
            FailureKind::Tls
        } else if err.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Protocol
        };

        UpstreamError::Unreachable { kind, message }
    }

    /// Failure kind, if this error means the origin was unreachable.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            UpstreamError::Unreachable { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;
