//! Client-visible error envelope.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::request::TranslateError;
use crate::upstream::UpstreamError;

/// Longest diagnostic included in an error body.
pub const MAX_DIAGNOSTIC_CHARS: usize = 200;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UpstreamUnreachable,
    TranslationError,
    BadRequest,
    NotFound,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorCode::UpstreamUnreachable => "UPSTREAM_UNREACHABLE",
            ErrorCode::TranslationError => "TRANSLATION_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Internal => "INTERNAL",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Error returned by handlers, rendered as `(status, Json(ErrorResponse))`.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ProxyError {
    pub fn new(status: StatusCode, error: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            status,
            response: ErrorResponse {
                error: truncate_diagnostic(&error.into(), MAX_DIAGNOSTIC_CHARS),
                code,
                path: None,
            },
        }
    }

    pub fn upstream(err: &UpstreamError) -> Self {
        match err {
            UpstreamError::Unreachable { .. } | UpstreamError::Closed => Self::new(
                StatusCode::BAD_GATEWAY,
                err.to_string(),
                ErrorCode::UpstreamUnreachable,
            ),
            UpstreamError::Build(_) | UpstreamError::InvalidUrl(_) => {
                Self::internal(err.to_string())
            }
        }
    }

    pub fn translation(err: &TranslateError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.to_string(),
            ErrorCode::TranslationError,
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, ErrorCode::BadRequest)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, ErrorCode::Internal)
    }

    /// The envelope for requests no route matched.
    pub fn not_found(path: impl Into<String>) -> Self {
        let mut err = Self::new(StatusCode::NOT_FOUND, "Not Found", ErrorCode::NotFound);
        err.response.path = Some(path.into());
        err
    }
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        Self::upstream(&err)
    }
}

impl From<TranslateError> for ProxyError {
    fn from(err: TranslateError) -> Self {
        Self::translation(&err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

/// Cut `message` to at most `max` characters, marking the cut with `...`.
pub fn truncate_diagnostic(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let kept: String = message.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
