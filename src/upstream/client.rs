//! Upstream HTTP client with pooling, timeout and error classification.
//!
//! # Responsibilities
//! - Hold one pooled `reqwest::Client` for the process lifetime
//! - Apply fixed default headers, timeout and redirect policy
//! - Execute translated requests and read the whole body
//! - Classify failures into distinguishable `UpstreamError`s
//! - Release pooled sockets on shutdown

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use reqwest::redirect::Policy;
use reqwest::Client;

use crate::observability::metrics;
use crate::upstream::target::ProxyTarget;
use crate::upstream::types::{
    ProxyBody, ProxyRequest, UpstreamError, UpstreamResponse, UpstreamResult,
};

enum ClientSlot {
    Unbuilt,
    Ready(Client),
    Closed,
}

/// Shared client for the upstream origin.
///
/// The inner `reqwest::Client` is built on first use and reused for every
/// later call. `close` drops it, after which `send` fails with
/// `UpstreamError::Closed`.
pub struct UpstreamClient {
    target: Arc<ProxyTarget>,
    slot: Mutex<ClientSlot>,
}

impl UpstreamClient {
    /// Create a client for the given target. Nothing is connected yet.
    pub fn new(target: Arc<ProxyTarget>) -> Self {
        Self {
            target,
            slot: Mutex::new(ClientSlot::Unbuilt),
        }
    }

    /// The origin this client talks to.
    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    fn lock(&self) -> MutexGuard<'_, ClientSlot> {
        // The slot holds no invariants a panicking holder could break.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn client(&self) -> UpstreamResult<Client> {
        let mut slot = self.lock();
        match &*slot {
            ClientSlot::Ready(client) => Ok(client.clone()),
            ClientSlot::Closed => Err(UpstreamError::Closed),
            ClientSlot::Unbuilt => {
                let client = build_client(&self.target)?;
                tracing::info!(
                    base_url = %self.target.base(),
                    timeout_secs = self.target.timeout().as_secs(),
                    max_redirects = self.target.max_redirects(),
                    accept_invalid_certs = self.target.accept_invalid_certs(),
                    "Upstream client initialized"
                );
                *slot = ClientSlot::Ready(client.clone());
                Ok(client)
            }
        }
    }

    /// Execute one request against the origin.
    ///
    /// Non-2xx statuses are not errors; only failing to obtain a response
    /// at all is. No retries are attempted.
    pub async fn send(&self, request: ProxyRequest) -> UpstreamResult<UpstreamResponse> {
        let client = self.client()?;
        let ProxyRequest {
            method,
            url,
            query,
            headers,
            body,
        } = request;

        tracing::debug!(method = %method, url = %url, "Sending upstream request");
        let started = Instant::now();

        let mut builder = client.request(method.clone(), url.clone()).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match body {
            ProxyBody::Empty => builder,
            ProxyBody::Json(value) => builder.json(&value),
            ProxyBody::Form(fields) => builder.form(&fields),
            ProxyBody::Raw(bytes) => builder.body(bytes),
        };

        let response = builder.send().await.map_err(|e| self.fail(&url, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response.bytes().await.map_err(|e| self.fail(&url, e))?;

        tracing::debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream response received"
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
            url: final_url,
        })
    }

    fn fail(&self, url: &url::Url, err: reqwest::Error) -> UpstreamError {
        let err = UpstreamError::from_reqwest(err);
        if let Some(kind) = err.failure_kind() {
            metrics::record_upstream_failure(kind);
        }
        tracing::warn!(url = %url, error = %err, "Upstream request failed");
        err
    }

    /// Drop the pooled client, closing idle connections. Idempotent.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock(), ClientSlot::Closed);
        if let ClientSlot::Ready(client) = previous {
            drop(client);
            tracing::info!("Upstream client closed");
        }
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), ClientSlot::Closed)
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.target.base().as_str())
            .field("timeout_secs", &self.target.timeout().as_secs())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn build_client(target: &ProxyTarget) -> UpstreamResult<Client> {
    let mut builder = Client::builder()
        .default_headers(target.default_headers().clone())
        .timeout(target.timeout())
        .redirect(Policy::limited(target.max_redirects()));

    if target.accept_invalid_certs() {
        tracing::warn!("TLS certificate verification is disabled for the upstream origin");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| UpstreamError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::upstream::types::FailureKind;
    use url::Url;

    fn client_for(base_url: &str, timeout_secs: u64) -> UpstreamClient {
        let target = ProxyTarget::from_config(&UpstreamConfig {
            base_url: base_url.to_string(),
            timeout_secs,
            ..UpstreamConfig::default()
        })
        .unwrap();
        UpstreamClient::new(Arc::new(target))
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Grab a free port, then release it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}/", addr);
        let client = client_for(&base, 2);
        let err = client
            .send(ProxyRequest::get(Url::parse(&base).unwrap()))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Unreachable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let base = format!("http://{}/", addr);
        let client = client_for(&base, 1);
        let err = client
            .send(ProxyRequest::get(Url::parse(&base).unwrap()))
            .await
            .unwrap_err();

        assert_eq!(err.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let client = client_for("http://127.0.0.1:9/", 1);
        assert!(!client.is_closed());
        client.close();
        client.close();
        assert!(client.is_closed());

        let err = client
            .send(ProxyRequest::get(Url::parse("http://127.0.0.1:9/").unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Closed));
    }
}
