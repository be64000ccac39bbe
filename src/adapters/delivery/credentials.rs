//! Downstream credentials
//!
//! A [`CredentialProvider`] produces the `Authorization` header value sent
//! with every envelope. The [`CredentialRefresher`] in front of it caches the
//! header and asks the provider again at most once per refresh interval.

use crate::config::{AuthConfig, SecretString};
use crate::domain::{DeliveryError, RelayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Source of the downstream authorization header
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Issue a header value, or `None` when requests go unauthenticated
    async fn authorization_header(
        &self,
        client: &Client,
    ) -> std::result::Result<Option<String>, DeliveryError>;
}

/// Unauthenticated delivery
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn authorization_header(
        &self,
        _client: &Client,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        Ok(None)
    }
}

/// Fixed bearer token from configuration
pub struct StaticBearer {
    token: SecretString,
}

impl StaticBearer {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticBearer {
    fn name(&self) -> &'static str {
        "bearer"
    }

    async fn authorization_header(
        &self,
        _client: &Client,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        Ok(Some(format!("Bearer {}", self.token.expose_secret().as_str())))
    }
}

/// OAuth2 resource owner password grant against a Keycloak realm
pub struct KeycloakPasswordGrant {
    token_endpoint: String,
    username: String,
    password: SecretString,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

impl KeycloakPasswordGrant {
    pub fn new(
        token_uri: &str,
        realm: &str,
        username: impl Into<String>,
        password: SecretString,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            token_endpoint: format!(
                "{}/realms/{}/protocol/openid-connect/token",
                token_uri.trim_end_matches('/'),
                realm
            ),
            username: username.into(),
            password,
            client_id: client_id.into(),
        }
    }

    /// Token endpoint the grant is posted to
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }
}

#[async_trait]
impl CredentialProvider for KeycloakPasswordGrant {
    fn name(&self) -> &'static str {
        "keycloak"
    }

    async fn authorization_header(
        &self,
        client: &Client,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        tracing::debug!(endpoint = %self.token_endpoint, "Requesting access token");

        let form = [
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.expose_secret().as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let response = client
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                DeliveryError::AuthenticationFailed(format!("Token request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::AuthenticationFailed(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            DeliveryError::AuthenticationFailed(format!("Invalid token response: {e}"))
        })?;
        let token_type = token
            .token_type
            .filter(|t| !t.is_empty())
            .map(|t| if t.eq_ignore_ascii_case("bearer") { "Bearer".to_string() } else { t })
            .unwrap_or_else(|| "Bearer".to_string());

        Ok(Some(format!("{token_type} {}", token.access_token)))
    }
}

/// Build the provider selected by `downstream.auth.auth_type`
///
/// # Errors
///
/// Returns a configuration error if a required setting is missing.
pub fn provider_from_config(config: &AuthConfig) -> Result<Box<dyn CredentialProvider>> {
    let missing = |name: &str| {
        RelayError::Configuration(format!(
            "downstream.auth.{name} is required when auth_type is '{}'",
            config.auth_type
        ))
    };

    match config.auth_type.as_str() {
        "none" => Ok(Box::new(NoCredentials)),
        "bearer" => {
            let token = config.token.clone().ok_or_else(|| missing("token"))?;
            Ok(Box::new(StaticBearer::new(token)))
        }
        "keycloak" => Ok(Box::new(KeycloakPasswordGrant::new(
            config.token_uri.as_deref().ok_or_else(|| missing("token_uri"))?,
            config.realm.as_deref().ok_or_else(|| missing("realm"))?,
            config.username.clone().ok_or_else(|| missing("username"))?,
            config.password.clone().ok_or_else(|| missing("password"))?,
            config.client_id.clone().ok_or_else(|| missing("client_id"))?,
        ))),
        other => Err(RelayError::Configuration(format!(
            "Unknown downstream.auth.auth_type '{other}'"
        ))),
    }
}

struct CachedHeader {
    header: Option<String>,
    refreshed_at: Instant,
}

/// Caches the provider's header for a fixed window
///
/// One refresher is shared by every dispatcher of the process; the mutex makes
/// concurrent callers wait for a single refresh rather than issuing their own.
pub struct CredentialRefresher {
    provider: Box<dyn CredentialProvider>,
    refresh_interval: Duration,
    cached: Mutex<Option<CachedHeader>>,
}

impl CredentialRefresher {
    pub fn new(provider: Box<dyn CredentialProvider>, refresh_interval: Duration) -> Self {
        Self {
            provider,
            refresh_interval,
            cached: Mutex::new(None),
        }
    }

    /// Current header, refreshed when the window has elapsed
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::AuthenticationFailed`] if the provider fails.
    /// A failed refresh leaves the cache empty so the next call retries.
    pub async fn header(
        &self,
        client: &Client,
    ) -> std::result::Result<Option<String>, DeliveryError> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.refreshed_at.elapsed() < self.refresh_interval {
                return Ok(entry.header.clone());
            }
        }

        *cached = None;
        let header = self.provider.authorization_header(client).await?;
        tracing::info!(provider = self.provider.name(), "Downstream credentials refreshed");

        *cached = Some(CachedHeader {
            header: header.clone(),
            refreshed_at: Instant::now(),
        });
        Ok(header)
    }

    /// Drop the cached header so the next call refreshes
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn authorization_header(
            &self,
            _client: &Client,
        ) -> std::result::Result<Option<String>, DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(format!("Bearer token-{n}")))
        }
    }

    #[tokio::test]
    async fn test_header_reused_inside_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let refresher = CredentialRefresher::new(
            Box::new(CountingProvider {
                calls: calls.clone(),
            }),
            Duration::from_secs(3600),
        );
        let client = Client::new();

        assert_eq!(
            refresher.header(&client).await.unwrap().as_deref(),
            Some("Bearer token-1")
        );
        assert_eq!(
            refresher.header(&client).await.unwrap().as_deref(),
            Some("Bearer token-1")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        refresher.invalidate().await;
        assert_eq!(
            refresher.header(&client).await.unwrap().as_deref(),
            Some("Bearer token-2")
        );
    }

    #[tokio::test]
    async fn test_header_refreshed_after_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let refresher = CredentialRefresher::new(
            Box::new(CountingProvider {
                calls: calls.clone(),
            }),
            Duration::ZERO,
        );
        let client = Client::new();

        refresher.header(&client).await.unwrap();
        refresher.header(&client).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_keycloak_endpoint() {
        let grant = KeycloakPasswordGrant::new(
            "https://auth.example.org/",
            "eds",
            "relay",
            secret_string("pw".to_string()),
            "hl7relay",
        );
        assert_eq!(
            grant.token_endpoint(),
            "https://auth.example.org/realms/eds/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = AuthConfig::default();
        assert_eq!(provider_from_config(&config).unwrap().name(), "none");

        config.auth_type = "bearer".to_string();
        assert!(provider_from_config(&config).is_err());

        config.token = Some(secret_string("abc".to_string()));
        assert_eq!(provider_from_config(&config).unwrap().name(), "bearer");
    }
}
