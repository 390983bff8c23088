//! Fetch a page from the origin and report its structure.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::analyzer::headlines::{extract_headlines, Headline};
use crate::analyzer::structure::{extract_structure, SiteStructure};
use crate::http::error::truncate_diagnostic;
use crate::upstream::{ProxyRequest, UpstreamClient, UpstreamError};

/// Longest diagnostic returned in a failed report.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Fetch(#[from] UpstreamError),

    #[error("origin answered with status {0}")]
    Status(u16),
}

/// Outcome of one analysis. Failures are reported in-band, not as HTTP
/// errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    Structure(Box<SiteStructure>),
    Failed { error: String, url: String },
}

impl AnalysisReport {
    pub fn is_failed(&self) -> bool {
        matches!(self, AnalysisReport::Failed { .. })
    }
}

/// Outcome of one headline extraction, reported in-band like
/// `AnalysisReport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeadlineReport {
    Found {
        success: bool,
        url: String,
        data: Vec<Headline>,
        total_found: usize,
    },
    Failed {
        success: bool,
        url: String,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct SiteAnalyzer {
    upstream: Arc<UpstreamClient>,
    max_endpoints: usize,
}

impl SiteAnalyzer {
    pub fn new(upstream: Arc<UpstreamClient>, max_endpoints: usize) -> Self {
        Self {
            upstream,
            max_endpoints,
        }
    }

    /// Analyze `url`, folding any failure into the report.
    pub async fn analyze(&self, url: &Url) -> AnalysisReport {
        match self.try_analyze(url).await {
            Ok(structure) => AnalysisReport::Structure(Box::new(structure)),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Site analysis failed");
                AnalysisReport::Failed {
                    error: truncate_diagnostic(&e.to_string(), MAX_ERROR_CHARS),
                    url: url.to_string(),
                }
            }
        }
    }

    pub async fn try_analyze(&self, url: &Url) -> Result<SiteStructure, AnalysisError> {
        let html = self.fetch_page(url).await?;
        let structure = extract_structure(&html, url, self.max_endpoints);
        tracing::info!(
            url = %url,
            forms = structure.forms_count,
            links = structure.links.len(),
            endpoints = structure.api_endpoints.len(),
            has_login_form = structure.has_login_form,
            "Site analyzed"
        );
        Ok(structure)
    }

    /// Headlines from the page at `url`, folding any failure into the
    /// report.
    pub async fn headlines(&self, url: &Url) -> HeadlineReport {
        match self.fetch_page(url).await {
            Ok(html) => {
                let headlines = extract_headlines(&html, url);
                tracing::debug!(url = %url, found = headlines.total_found, "Headlines extracted");
                HeadlineReport::Found {
                    success: true,
                    url: url.to_string(),
                    data: headlines.items,
                    total_found: headlines.total_found,
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Headline extraction failed");
                HeadlineReport::Failed {
                    success: false,
                    url: url.to_string(),
                    error: truncate_diagnostic(&e.to_string(), MAX_ERROR_CHARS),
                }
            }
        }
    }

    /// GET `url` and decode the body; non-2xx answers are errors.
    async fn fetch_page(&self, url: &Url) -> Result<String, AnalysisError> {
        let response = self.upstream.send(ProxyRequest::get(url.clone())).await?;
        if !response.status.is_success() {
            return Err(AnalysisError::Status(response.status.as_u16()));
        }
        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::upstream::ProxyTarget;

    #[tokio::test]
    async fn test_unreachable_origin_is_reported_in_band() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}/app/", addr);
        let target = ProxyTarget::from_config(&UpstreamConfig {
            base_url: base.clone(),
            timeout_secs: 2,
            ..UpstreamConfig::default()
        })
        .unwrap();
        let analyzer = SiteAnalyzer::new(Arc::new(UpstreamClient::new(Arc::new(target))), 50);

        let report = analyzer.analyze(&Url::parse(&base).unwrap()).await;
        match report {
            AnalysisReport::Failed { error, url } => {
                assert_eq!(url, base);
                assert!(!error.is_empty());
                assert!(error.chars().count() <= MAX_ERROR_CHARS);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_origin_headlines_are_reported_in_band() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}/", addr);
        let target = ProxyTarget::from_config(&UpstreamConfig {
            base_url: base.clone(),
            timeout_secs: 2,
            ..UpstreamConfig::default()
        })
        .unwrap();
        let analyzer = SiteAnalyzer::new(Arc::new(UpstreamClient::new(Arc::new(target))), 50);

        let report = analyzer.headlines(&Url::parse(&base).unwrap()).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["url"], base);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_failed_report_shape() {
        let report = AnalysisReport::Failed {
            error: "boom".into(),
            url: "http://h/".into(),
        };
        assert!(report.is_failed());
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"error": "boom", "url": "http://h/"})
        );
    }
}
