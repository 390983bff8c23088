//! Route handlers.
//!
//! Each handler builds a `ProxyRequest` (through the translator or
//! directly), sends it with the shared upstream client and maps the result
//! back with the response translator. Errors become `ProxyError`.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::analyzer::{AnalysisReport, HeadlineReport};
use crate::cache::CacheEntry;
use crate::http::error::{truncate_diagnostic, ProxyError};
use crate::http::request::{translate, BodyMode, InboundRequest};
use crate::http::response::ProxyResponse;
use crate::http::server::AppState;
use crate::upstream::{ProxyRequest, UpstreamResponse};

/// Longest message returned by the connectivity check.
const MAX_TEST_MESSAGE_CHARS: usize = 100;

pub const SERVICE_NAME: &str = "origin-proxy";

/// `GET /`: service metadata and endpoint directory.
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.target.base().as_str(),
        "endpoints": {
            "/health": "Liveness probe",
            "/test": "Upstream connectivity check",
            "/proxy/{path}": "Generic proxy (GET, POST, PUT, PATCH, DELETE)",
            "/fetch?url=&use_cache=&refresh=": "Cache-aware page fetch",
            "/api/{path}": "JSON proxy (GET, POST)",
            "/resource?url=": "Static resource passthrough",
            "/analyze": "Site structure analysis",
            "/news": "Headline links from the landing page",
            "/view/{path}": "Browsable page with rewritten links",
        }
    }))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ConnectivityReport {
    Reached {
        success: bool,
        message: String,
        status_code: u16,
        content_length: usize,
    },
    Failed {
        success: bool,
        message: String,
        error_kind: &'static str,
    },
}

/// `GET /test`: one GET against the base URL. Always answers 200.
pub async fn test_connection(State(state): State<AppState>) -> Json<ConnectivityReport> {
    let base = state.target.base().clone();
    let report = match state.upstream.send(ProxyRequest::get(base.clone())).await {
        Ok(response) => ConnectivityReport::Reached {
            success: response.status.is_success(),
            message: format!("Origin {} answered with status {}", base, response.status),
            status_code: response.status.as_u16(),
            content_length: response.body.len(),
        },
        Err(e) => ConnectivityReport::Failed {
            success: false,
            message: truncate_diagnostic(&e.to_string(), MAX_TEST_MESSAGE_CHARS),
            error_kind: e.failure_kind().map(|k| k.as_str()).unwrap_or("internal"),
        },
    };
    Json(report)
}

/// `/proxy/{path}`: full method, header and body passthrough.
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ProxyResponse, ProxyError> {
    let inbound = InboundRequest::from_parts(method, &uri, "/proxy", headers, body);
    let request = translate(&state.target, inbound, BodyMode::ByContentType).await?;
    let upstream = state.upstream.send(request).await?;
    Ok(ProxyResponse::from_upstream(upstream))
}

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub use_cache: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub refresh: Option<bool>,
}

/// Query flag accepting `true/false`, `1/0`, `yes/no`, `on/off`, `t/f` and
/// `y/n`, case-insensitively.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(Some(true)),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(Some(false)),
        _ => Err(de::Error::invalid_value(
            de::Unexpected::Str(&raw),
            &"a boolean flag",
        )),
    }
}

/// JSON envelope returned by `/fetch`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FetchEnvelope {
    pub url: String,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub content: String,
    pub timestamp: String,
    pub cached: bool,
}

impl FetchEnvelope {
    fn from_entry(entry: CacheEntry, cached: bool) -> Self {
        Self {
            url: entry.url,
            status_code: entry.status_code,
            headers: entry.headers,
            content: entry.body,
            timestamp: entry.fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            cached,
        }
    }
}

/// `GET /fetch`: cache-aware single page fetch.
pub async fn fetch(
    State(state): State<AppState>,
    params: Result<Query<FetchParams>, QueryRejection>,
) -> Result<Json<FetchEnvelope>, ProxyError> {
    let Query(params) = params.map_err(|e| ProxyError::bad_request(e.body_text()))?;
    let url = resolve_same_origin(&state, params.url.as_deref().unwrap_or_default())?;
    let use_cache = params.use_cache.unwrap_or(true);
    let refresh = params.refresh.unwrap_or(false);

    if use_cache && !refresh {
        if let Some(entry) = state.cache.lookup(url.as_str(), state.cache_max_age).await {
            tracing::debug!(url = %url, "Serving from cache");
            return Ok(Json(FetchEnvelope::from_entry(entry, true)));
        }
    }

    let response = state.upstream.send(ProxyRequest::get(url.clone())).await?;
    let entry = CacheEntry {
        url: url.to_string(),
        fetched_at: Utc::now(),
        status_code: response.status.as_u16(),
        headers: header_map_to_strings(&response.headers),
        body: response.text(),
    };

    if use_cache && response.status.is_success() {
        if let Err(e) = state.cache.store(&entry).await {
            tracing::warn!(url = %url, error = %e, "Cache write failed");
        }
    }

    Ok(Json(FetchEnvelope::from_entry(entry, false)))
}

/// `/api/{path}`: GET forwards the query, POST forwards a JSON body.
pub async fn api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let inbound = InboundRequest::from_parts(method, &uri, "/api", headers, body);
    let request = translate(&state.target, inbound, BodyMode::Json).await?;
    let upstream = state.upstream.send(request).await?;
    Ok(json_or_text(upstream))
}

/// Upstream body as JSON when it parses, otherwise as plain text.
pub fn json_or_text(upstream: UpstreamResponse) -> Response {
    match serde_json::from_slice::<Value>(&upstream.body) {
        Ok(value) => (upstream.status, Json(value)).into_response(),
        Err(_) => (
            upstream.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            upstream.text(),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResourceParams {
    pub url: String,
}

/// `GET /resource`: static resource passthrough with a day-long cache
/// header.
pub async fn resource(
    State(state): State<AppState>,
    params: Result<Query<ResourceParams>, QueryRejection>,
) -> Result<ProxyResponse, ProxyError> {
    let Query(params) = params.map_err(|e| ProxyError::bad_request(e.body_text()))?;
    let url = resolve_same_origin(&state, &params.url)?;
    let upstream = state.upstream.send(ProxyRequest::get(url)).await?;
    Ok(ProxyResponse::from_upstream(upstream).with_static_cache_control())
}

/// `GET /analyze`: analysis failures are reported with status 200.
pub async fn analyze(State(state): State<AppState>) -> Json<AnalysisReport> {
    Json(state.analyzer.analyze(state.target.base()).await)
}

/// `GET /news`: headlines of the base page, failures reported with
/// status 200.
pub async fn news(State(state): State<AppState>) -> Json<HeadlineReport> {
    Json(state.analyzer.headlines(state.target.base()).await)
}

/// `GET /view/{path}`: HTML with origin-absolute links pointed back at the
/// proxy. Anything else passes through.
pub async fn view(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<ProxyResponse, ProxyError> {
    let inbound = InboundRequest::from_parts(method, &uri, "/view", headers, Bytes::new());
    let request = translate(&state.target, inbound, BodyMode::ByContentType).await?;
    let response = ProxyResponse::from_upstream(state.upstream.send(request).await?);

    if !response.is_html() {
        return Ok(response);
    }
    let rewritten = state.rewriter.rewrite(&response.body);
    Ok(response.with_body(rewritten))
}

/// Unmatched routes.
pub async fn not_found(uri: Uri) -> ProxyError {
    tracing::debug!(path = %uri.path(), "No route matched");
    ProxyError::not_found(uri.path())
}

/// Join `reference` against the base origin and refuse anything that
/// leaves it.
fn resolve_same_origin(state: &AppState, reference: &str) -> Result<Url, ProxyError> {
    let url = state
        .target
        .resolve(reference)
        .map_err(|e| ProxyError::bad_request(format!("invalid url {reference:?}: {e}")))?;
    if !state.target.is_same_origin(&url) {
        return Err(ProxyError::bad_request(format!(
            "url must stay on the upstream origin {}",
            state.target.base().origin().ascii_serialization()
        )));
    }
    Ok(url)
}

/// Flatten a header map, joining repeated values with `, `. Values that are
/// not visible ASCII are skipped.
pub fn header_map_to_strings(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, StatusCode};

    #[test]
    fn test_header_map_to_strings_joins_duplicates() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(
            HeaderName::from_static("x-binary"),
            HeaderValue::from_bytes(b"\xff").unwrap(),
        );

        let map = header_map_to_strings(&headers);
        assert_eq!(map["set-cookie"], "a=1, b=2");
        assert_eq!(map["content-type"], "text/html");
        assert!(!map.contains_key("x-binary"));
    }

    fn fetch_params(query: &str) -> Result<FetchParams, QueryRejection> {
        let uri: Uri = format!("/fetch?{query}").parse().unwrap();
        Query::<FetchParams>::try_from_uri(&uri).map(|Query(p)| p)
    }

    #[test]
    fn test_fetch_flags_are_lenient() {
        let p = fetch_params("use_cache=0&refresh=YES").unwrap();
        assert_eq!(p.use_cache, Some(false));
        assert_eq!(p.refresh, Some(true));

        let p = fetch_params("use_cache=on&refresh=false").unwrap();
        assert_eq!(p.use_cache, Some(true));
        assert_eq!(p.refresh, Some(false));

        let p = fetch_params("url=plain").unwrap();
        assert_eq!(p.use_cache, None);
        assert_eq!(p.refresh, None);

        assert!(fetch_params("use_cache=maybe").is_err());
    }

    #[tokio::test]
    async fn test_json_or_text() {
        let upstream = |body: &'static [u8]| UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body),
            url: Url::parse("http://h/").unwrap(),
        };

        let json = json_or_text(upstream(br#"{"ok":true}"#));
        assert_eq!(json.headers()[header::CONTENT_TYPE], "application/json");

        let text = json_or_text(upstream(b"<html></html>"));
        assert_eq!(text.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = axum::body::to_bytes(text.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html></html>");
    }
}
