//! HTTP delivery of envelopes

use super::credentials::{provider_from_config, CredentialProvider, CredentialRefresher};
use super::envelope::Envelope;
use crate::config::DownstreamConfig;
use crate::domain::{DeliveryError, RelayError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;

/// Delivers envelopes to the downstream service
#[async_trait]
pub trait EnvelopeSender: Send + Sync {
    /// Send one envelope
    ///
    /// Returns the formatted response (`"<status line>\r\n<body>"`) on success.
    async fn send(&self, envelope: &Envelope) -> std::result::Result<String, DeliveryError>;
}

/// Sender posting envelopes over HTTP(S)
pub struct HttpEnvelopeSender {
    url: String,
    client: Client,
    credentials: CredentialRefresher,
}

impl HttpEnvelopeSender {
    /// Create a sender using the credentials configured under `downstream.auth`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the auth
    /// settings are incomplete.
    pub fn new(config: &DownstreamConfig) -> Result<Self> {
        let provider = provider_from_config(&config.auth)?;
        Self::with_provider(config, provider)
    }

    /// Create a sender with an explicit credential provider
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_provider(
        config: &DownstreamConfig,
        provider: Box<dyn CredentialProvider>,
    ) -> Result<Self> {
        let mut client_builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)));

        if !config.tls_verify {
            tracing::warn!(url = %config.url, "TLS certificate verification is disabled");
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: config.url.clone(),
            client,
            credentials: CredentialRefresher::new(
                provider,
                Duration::from_secs(config.auth.refresh_interval_minutes * 60),
            ),
        })
    }
}

#[async_trait]
impl EnvelopeSender for HttpEnvelopeSender {
    async fn send(&self, envelope: &Envelope) -> std::result::Result<String, DeliveryError> {
        let authorization = self.credentials.header(&self.client).await?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(envelope.body.clone());
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout(e.to_string())
            } else {
                DeliveryError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            DeliveryError::ConnectionFailed(format!("Failed to read response body: {e}"))
        })?;
        let status_line = status_line(status);

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.credentials.invalidate().await;
            }
            tracing::warn!(
                request_uuid = %envelope.request_uuid,
                status = status.as_u16(),
                "Downstream rejected envelope"
            );
            return Err(DeliveryError::Rejected { status_line, body });
        }

        tracing::debug!(
            request_uuid = %envelope.request_uuid,
            status = status.as_u16(),
            "Envelope delivered"
        );
        Ok(format!("{status_line}\r\n{body}"))
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP/1.1 {} {reason}", status.as_u16()),
        None => format!("HTTP/1.1 {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(StatusCode::OK), "HTTP/1.1 200 OK");
        assert_eq!(
            status_line(StatusCode::INTERNAL_SERVER_ERROR),
            "HTTP/1.1 500 Internal Server Error"
        );
        assert_eq!(status_line(StatusCode::from_u16(599).unwrap()), "HTTP/1.1 599");
    }
}
