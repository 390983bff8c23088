//! Inbound-to-upstream request translation.
//!
//! # Responsibilities
//! - Resolve the inbound path against the origin base URL
//! - Drop hop-specific inbound headers
//! - Decode the body according to its declared content type
//!
//! The whole body is held in memory once; streaming uploads are not
//! supported.

use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Method, Request, Uri,
    },
};
use thiserror::Error;

use crate::upstream::{ProxyBody, ProxyRequest, ProxyTarget};

/// Inbound headers never forwarded upstream. The upstream client computes
/// its own values for these.
pub const HOP_HEADERS: [HeaderName; 5] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::ACCEPT_ENCODING,
    header::TRANSFER_ENCODING,
];

/// Body cannot be decoded as its declared content type.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid multipart body: {0}")]
    Multipart(String),

    #[error("cannot resolve upstream path: {0}")]
    Url(#[from] url::ParseError),
}

/// How the inbound body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Dispatch on the declared `Content-Type`.
    ByContentType,
    /// Decode as JSON whatever the declared type.
    Json,
}

/// One inbound call, already split from the route prefix.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path relative to the route, percent-encoding preserved.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Build from the raw request parts, removing `route_prefix` (e.g.
    /// `/proxy`) and one following `/` from the URI path.
    pub fn from_parts(
        method: Method,
        uri: &Uri,
        route_prefix: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path: route_relative_path(uri.path(), route_prefix).to_string(),
            query: parse_query(uri.query()),
            headers,
            body,
        }
    }
}

/// `/proxy/a/b.do` with prefix `/proxy` gives `a/b.do`; `/proxy` gives ``.
pub fn route_relative_path<'a>(path: &'a str, route_prefix: &str) -> &'a str {
    let rest = path.strip_prefix(route_prefix).unwrap_or(path);
    rest.strip_prefix('/').unwrap_or(rest)
}

/// Decode a raw query string into ordered pairs.
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// Translate an inbound request into a call against `target`.
pub async fn translate(
    target: &ProxyTarget,
    inbound: InboundRequest,
    mode: BodyMode,
) -> Result<ProxyRequest, TranslateError> {
    let url = target.resolve(&inbound.path)?;
    let mut headers = forwardable_headers(&inbound.headers);
    let content_type = inbound.headers.get(header::CONTENT_TYPE).cloned();

    let body = match mode {
        BodyMode::Json if inbound.body.is_empty() => ProxyBody::Empty,
        BodyMode::Json => ProxyBody::Json(serde_json::from_slice(&inbound.body)?),
        BodyMode::ByContentType => decode_body(content_type.as_ref(), inbound.body).await?,
    };

    // The re-encoded body gets its content type from the upstream client.
    if matches!(body, ProxyBody::Json(_) | ProxyBody::Form(_)) {
        headers.remove(header::CONTENT_TYPE);
    }

    tracing::debug!(
        method = %inbound.method,
        url = %url,
        body = body_kind(&body),
        "Request translated"
    );

    Ok(ProxyRequest {
        method: inbound.method,
        url,
        query: inbound.query,
        headers,
        body,
    })
}

/// Inbound headers minus `HOP_HEADERS`.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in &HOP_HEADERS {
        headers.remove(name);
    }
    headers
}

/// Lower-cased media type without parameters.
fn essence(content_type: &HeaderValue) -> Option<String> {
    let value = content_type.to_str().ok()?;
    let media = value.split(';').next().unwrap_or_default().trim();
    Some(media.to_ascii_lowercase())
}

async fn decode_body(
    content_type: Option<&HeaderValue>,
    body: Bytes,
) -> Result<ProxyBody, TranslateError> {
    if body.is_empty() {
        return Ok(ProxyBody::Empty);
    }

    let Some(content_type) = content_type else {
        return Ok(ProxyBody::Raw(body));
    };

    match essence(content_type).as_deref() {
        Some("application/json") => Ok(ProxyBody::Json(serde_json::from_slice(&body)?)),
        Some("application/x-www-form-urlencoded") => Ok(ProxyBody::Form(
            url::form_urlencoded::parse(&body).into_owned().collect(),
        )),
        Some("multipart/form-data") => Ok(ProxyBody::Form(
            decode_multipart(content_type, body).await?,
        )),
        _ => Ok(ProxyBody::Raw(body)),
    }
}

/// Flatten a multipart body into text fields. File parts contribute their
/// file name, not their content.
async fn decode_multipart(
    content_type: &HeaderValue,
    body: Bytes,
) -> Result<BTreeMap<String, String>, TranslateError> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type.clone())
        .body(Body::from(body))
        .map_err(|e| TranslateError::Multipart(e.to_string()))?;
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| TranslateError::Multipart(e.body_text()))?;

    let mut fields = BTreeMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TranslateError::Multipart(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = match field.file_name().map(str::to_string) {
            Some(file_name) => file_name,
            None => field
                .text()
                .await
                .map_err(|e| TranslateError::Multipart(e.to_string()))?,
        };
        fields.insert(name, value);
    }
    Ok(fields)
}

fn body_kind(body: &ProxyBody) -> &'static str {
    match body {
        ProxyBody::Empty => "empty",
        ProxyBody::Json(_) => "json",
        ProxyBody::Form(_) => "form",
        ProxyBody::Raw(_) => "raw",
    }
}
