//! Request authentication headers.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::{AuthConfig, AuthType};
use crate::credentials::{Credentials, TokenCache};
use crate::providers::types::{ProviderError, ProviderResult};
use crate::transport::Transport;

const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

/// Turns loaded credentials into the headers a dependency expects.
///
/// | type | credential fields | header |
/// |---|---|---|
/// | api_key | `api_key` | `<header_name>: <key>` |
/// | bearer | `token` | `Authorization: Bearer <token>` |
/// | basic | `username`, `password` | `Authorization: Basic <b64>` |
/// | oauth2 | `client_id`, `client_secret` | `Authorization: Bearer <access token>` |
#[derive(Debug)]
pub struct Authenticator {
    config: AuthConfig,
    tokens: Option<TokenCache>,
}

impl Authenticator {
    pub fn new(provider_id: &str, config: AuthConfig, timeout: Duration, transport: Arc<dyn Transport>) -> Self {
        let tokens = match (config.auth_type, &config.token_url) {
            (AuthType::OAuth2, Some(token_url)) => Some(TokenCache::new(
                provider_id,
                token_url.clone(),
                config.scope.clone(),
                timeout,
                transport,
            )),
            _ => None,
        };
        Self { config, tokens }
    }

    pub fn auth_type(&self) -> AuthType {
        self.config.auth_type
    }

    pub async fn headers(&self, credentials: &Credentials) -> ProviderResult<Vec<(String, String)>> {
        let header = match self.config.auth_type {
            AuthType::ApiKey => {
                let name = self
                    .config
                    .header_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
                (name, required(credentials, "api_key")?.to_string())
            }
            AuthType::Bearer => (
                "Authorization".to_string(),
                format!("Bearer {}", required(credentials, "token")?),
            ),
            AuthType::Basic => {
                let user = required(credentials, "username")?;
                let pass = required(credentials, "password")?;
                let encoded = STANDARD.encode(format!("{}:{}", user, pass));
                ("Authorization".to_string(), format!("Basic {}", encoded))
            }
            AuthType::OAuth2 => {
                let tokens = self
                    .tokens
                    .as_ref()
                    .ok_or_else(|| ProviderError::Auth("oauth2 requires a token_url".to_string()))?;
                let token = tokens.access_token(credentials).await?;
                ("Authorization".to_string(), format!("Bearer {}", token))
            }
        };
        Ok(vec![header])
    }

    /// Forget any cached OAuth2 token.
    pub async fn invalidate(&self) {
        if let Some(tokens) = &self.tokens {
            tokens.invalidate().await;
        }
    }
}

fn required<'a>(credentials: &'a Credentials, field: &str) -> ProviderResult<&'a str> {
    credentials
        .get_str(field)
        .ok_or_else(|| ProviderError::Auth(format!("missing credential field '{}'", field)))
}
