use crate::error::PushError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure. Exactly one of these or a well-formed
/// response comes back from every request; provider-specific
/// classification happens on top.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
}

impl From<TransportError> for PushError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => Self::Timeout(msg),
            TransportError::Connection(msg) => Self::Connection(msg),
        }
    }
}

/// A well-formed HTTP response from the provider, any status code.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Issues authenticated JSON POST requests against one provider origin.
/// A single call returns exactly one outcome for its own request; errors
/// from other in-flight requests can never leak into it.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn post(
        &self,
        path: &str,
        body: &Value,
        headers: HeaderMap,
    ) -> Result<RawResponse, TransportError>;
}

/// Pooled HTTPS client bound to one provider origin (HTTP/2 negotiated
/// via ALPN, which APNs requires). One instance per distinct provider
/// configuration, shared across worker tasks for the process lifetime.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    origin: String,
}

impl HttpTransport {
    /// # Errors
    /// Returns a configuration error if the underlying client cannot be
    /// built.
    pub fn new(
        origin: impl Into<String>,
        request_timeout: Duration,
        pool_size: usize,
    ) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(pool_size)
            .build()
            .map_err(|e| PushError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, origin: origin.into() })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        body: &Value,
        headers: HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}{path}", self.origin);
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_request_error)?;

        Ok(RawResponse { status, body })
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        // Connection resets/refusals, unreachable hosts and TLS
        // handshake failures all land here.
        TransportError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_onto_the_taxonomy() {
        let timeout: PushError = TransportError::Timeout("deadline".into()).into();
        assert!(matches!(timeout, PushError::Timeout(_)));

        let connection: PushError = TransportError::Connection("refused".into()).into();
        assert!(matches!(connection, PushError::Connection(_)));
    }

    #[test]
    fn success_covers_the_2xx_range() {
        assert!(RawResponse { status: 200, body: String::new() }.is_success());
        assert!(RawResponse { status: 204, body: String::new() }.is_success());
        assert!(!RawResponse { status: 400, body: String::new() }.is_success());
        assert!(!RawResponse { status: 503, body: String::new() }.is_success());
    }
}
