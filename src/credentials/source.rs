//! Credential sources.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Decrypted credential fields for one provider, e.g. `api_key`,
/// `client_id`/`client_secret`, `username`/`password`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// Never print secret values.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed credentials for {provider}: {message}")]
    Malformed { provider: String, message: String },
}

/// Where decrypted provider credentials come from.
///
/// `Ok(None)` means the provider has no credentials configured.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn get_decrypted_credentials(&self, provider_id: &str) -> Result<Option<Credentials>, CredentialError>;
}

/// Reads `<PREFIX>_<PROVIDER>_<KEY>` environment variables.
///
/// `PROVIDER_SKY_SCAN_API_KEY=...` yields `{"api_key": ...}` for provider
/// `sky-scan` with the default prefix.
#[derive(Debug, Clone)]
pub struct EnvCredentialSource {
    prefix: String,
}

impl EnvCredentialSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_prefix(&self, provider_id: &str) -> String {
        let provider: String = provider_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}_{}_", self.prefix.to_ascii_uppercase(), provider)
    }

    /// Collect the credential fields for `provider_id` out of `vars`.
    pub fn collect<I>(&self, provider_id: &str, vars: I) -> Option<Credentials>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = self.var_prefix(provider_id);
        let credentials: Credentials = vars
            .into_iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(&prefix)
                    .filter(|key| !key.is_empty())
                    .map(|key| (key.to_ascii_lowercase(), value))
            })
            .collect();
        (!credentials.is_empty()).then_some(credentials)
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn get_decrypted_credentials(&self, provider_id: &str) -> Result<Option<Credentials>, CredentialError> {
        Ok(self.collect(provider_id, std::env::vars()))
    }
}

#[derive(Debug, Clone)]
enum StaticEntry {
    Present(Credentials),
    Failing(String),
}

/// In-memory source for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticCredentialSource {
    entries: DashMap<String, StaticEntry>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, provider_id: impl Into<String>, credentials: Credentials) -> Self {
        self.insert(provider_id, credentials);
        self
    }

    pub fn insert(&self, provider_id: impl Into<String>, credentials: Credentials) {
        self.entries
            .insert(provider_id.into(), StaticEntry::Present(credentials));
    }

    pub fn remove(&self, provider_id: &str) {
        self.entries.remove(provider_id);
    }

    /// Make lookups for `provider_id` fail, as a store outage would.
    pub fn fail(&self, provider_id: impl Into<String>, message: impl Into<String>) {
        self.entries
            .insert(provider_id.into(), StaticEntry::Failing(message.into()));
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn get_decrypted_credentials(&self, provider_id: &str) -> Result<Option<Credentials>, CredentialError> {
        match self.entries.get(provider_id).map(|e| e.value().clone()) {
            Some(StaticEntry::Present(credentials)) => Ok(Some(credentials)),
            Some(StaticEntry::Failing(message)) => Err(CredentialError::Unavailable(message)),
            None => Ok(None),
        }
    }
}
