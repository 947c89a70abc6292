//! OAuth2 client-credentials token cache.
//!
//! # Responsibilities
//! - Fetch access tokens from a provider's token endpoint
//! - Reuse a token until it is close to expiry
//!
//! # Design Decisions
//! - Single-flight: one async mutex serializes refreshes, waiters reuse the result
//! - Tokens are treated as expired 60s early
//! - A token is only reused for the credentials it was issued to
//! - Token requests bypass the provider's circuit and budget

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::credentials::Credentials;
use crate::providers::types::{ProviderError, ProviderResult};
use crate::resilience::retries::error_message;
use crate::resilience::timeouts::attempt_with_timeout;
use crate::transport::{Method, Transport, TransportBody, TransportRequest};

/// Safety margin before the upstream-declared expiry.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
    issued_for: Credentials,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_BUFFER < self.expires_at
    }

    fn usable_for(&self, credentials: &Credentials, now: Instant) -> bool {
        self.issued_for == *credentials && self.is_fresh(now)
    }
}

pub struct TokenCache {
    provider: String,
    token_url: String,
    scope: Option<String>,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(
        provider: impl Into<String>,
        token_url: impl Into<String>,
        scope: Option<String>,
        timeout: Duration,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            provider: provider.into(),
            token_url: token_url.into(),
            scope,
            timeout,
            transport,
            token: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one when needed.
    pub async fn access_token(&self, credentials: &Credentials) -> ProviderResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.usable_for(credentials, Instant::now())) {
            return Ok(token.access_token.clone());
        }

        let fresh = self.fetch(credentials).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token, e.g. after the upstream answered 401.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch(&self, credentials: &Credentials) -> ProviderResult<CachedToken> {
        let field = |name: &str| {
            credentials
                .get_str(name)
                .map(str::to_string)
                .ok_or_else(|| ProviderError::Auth(format!("missing credential field '{}'", name)))
        };
        let mut form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), field("client_id")?),
            ("client_secret".to_string(), field("client_secret")?),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope".to_string(), scope.clone()));
        }

        let mut request = TransportRequest::new(Method::POST, self.token_url.clone(), self.timeout);
        request.body = Some(TransportBody::Form(form));

        tracing::debug!(provider = %self.provider, "Fetching OAuth2 access token");
        let requested_at = Instant::now();
        let response = attempt_with_timeout(self.timeout, self.transport.request(request))
            .await
            .map_err(|e| ProviderError::Auth(format!("token request failed: {}", e)))?;

        if !(200..300).contains(&response.status) {
            tracing::warn!(provider = %self.provider, status = response.status, "Token endpoint refused credentials");
            return Err(ProviderError::Auth(format!(
                "token endpoint returned {}: {}",
                response.status,
                error_message(&response.body)
            )));
        }

        let token: TokenResponse = serde_json::from_value(response.body)
            .map_err(|e| ProviderError::Auth(format!("invalid token response: {}", e)))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: requested_at + lifetime,
            issued_for: credentials.clone(),
        })
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("provider", &self.provider)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
