//! Upstream-to-client response translation.

use axum::{
    body::{Body, Bytes},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Response},
};

use crate::upstream::UpstreamResponse;

/// Framing headers describing the origin's encoding of the body. The body
/// is already decoded, so these are recomputed by the server.
pub const FRAMING_HEADERS: [HeaderName; 3] = [
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
];

/// `Cache-Control` added to static resources lacking one.
pub const STATIC_CACHE_CONTROL: &str = "public, max-age=86400";

/// Response sent back to the client.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    /// Status and every non-framing header pass through unchanged.
    pub fn from_upstream(upstream: UpstreamResponse) -> Self {
        let mut headers = upstream.headers;
        for name in &FRAMING_HEADERS {
            headers.remove(name);
        }
        Self {
            status: upstream.status,
            headers,
            body: upstream.body,
        }
    }

    /// Add `Cache-Control: public, max-age=86400` unless the origin set its
    /// own.
    pub fn with_static_cache_control(mut self) -> Self {
        if !self.headers.contains_key(header::CACHE_CONTROL) {
            self.headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(STATIC_CACHE_CONTROL),
            );
        }
        self
    }

    /// Replace the body, keeping status and headers.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// True when the origin labelled the body as HTML.
    pub fn is_html(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"))
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
