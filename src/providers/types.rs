//! Provider-facing types: the response envelope and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ProviderCategory;

/// Free-form search parameters, forwarded to the upstream as query or body.
pub type SearchParams = Map<String, Value>;

/// Coarse error class, serialized into the envelope so callers can tell
/// "circuit/credentials" failures apart from ordinary upstream rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    RateLimitExceeded,
    CircuitOpen,
    RateLimited,
    ClientError,
    Transient,
    Decode,
    Credentials,
    AllProvidersExhausted,
}

/// Errors that can occur while calling an upstream provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Bad input; never retried, never reaches the network.
    #[error("Invalid parameters: {0}")]
    Validation(String),

    /// Local request budget exhausted; no network call made.
    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: String },

    /// Circuit breaker is open; no network call made.
    #[error("Circuit open for {provider}")]
    CircuitOpen { provider: String },

    /// Upstream answered 429.
    #[error("Upstream {provider} is throttling, retry after {retry_after_secs}s")]
    RateLimited { provider: String, retry_after_secs: u64 },

    /// Upstream rejected the request (4xx other than 429).
    #[error("Upstream rejected request with status {status}: {message}")]
    Client { status: u16, message: String },

    /// Upstream failed (5xx).
    #[error("Upstream error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// 2xx body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("No credentials loaded for {0}")]
    MissingCredentials(String),

    /// Credentials present but unusable (missing field, token endpoint refused).
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("All providers failed for category {0}")]
    AllProvidersExhausted(ProviderCategory),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Validation(_) => ErrorKind::Validation,
            ProviderError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            ProviderError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::Client { .. } => ErrorKind::ClientError,
            ProviderError::Server { .. }
            | ProviderError::Network(_)
            | ProviderError::Timeout { .. } => ErrorKind::Transient,
            ProviderError::Decode(_) => ErrorKind::Decode,
            ProviderError::MissingCredentials(_) | ProviderError::Auth(_) => ErrorKind::Credentials,
            ProviderError::AllProvidersExhausted(_) => ErrorKind::AllProvidersExhausted,
        }
    }

    /// Only 5xx, network and timeout failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Metadata attached to every envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Network attempts made; zero for local short-circuits.
    pub attempts: u32,
}

impl ResponseMetadata {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            timestamp: Utc::now(),
            rate_limit_remaining: None,
            retry_after: None,
            cached: None,
            request_id: None,
            attempts: 0,
        }
    }
}

/// Tagged result of a provider operation. Expected failures are carried
/// here instead of being returned as `Err`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub metadata: ResponseMetadata,
    #[serde(skip)]
    cause: Option<ProviderError>,
}

impl<T> ProviderResponse<T> {
    pub fn ok(data: T, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            metadata,
            cause: None,
        }
    }

    pub fn failure(error: ProviderError, mut metadata: ResponseMetadata) -> Self {
        if let Some(retry_after) = error.retry_after_secs() {
            metadata.retry_after = Some(retry_after);
        }
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            metadata,
            cause: Some(error),
        }
    }

    /// The typed error behind a failed envelope.
    pub fn cause(&self) -> Option<&ProviderError> {
        self.cause.as_ref()
    }

    pub fn into_result(self) -> ProviderResult<T> {
        match (self.cause, self.data) {
            (Some(error), _) => Err(error),
            (None, Some(data)) => Ok(data),
            (None, None) => Err(ProviderError::Decode("empty response".to_string())),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProviderResponse<U> {
        self.and_then(|data| Ok(f(data)))
    }

    /// Transform the payload; a transformation error turns the envelope into a failure.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> ProviderResult<U>) -> ProviderResponse<U> {
        match (self.cause, self.data) {
            (None, Some(data)) => match f(data) {
                Ok(mapped) => ProviderResponse::ok(mapped, self.metadata),
                Err(error) => ProviderResponse::failure(error, self.metadata),
            },
            (Some(error), _) => ProviderResponse::failure(error, self.metadata),
            (None, None) => ProviderResponse::failure(
                ProviderError::Decode("empty response".to_string()),
                self.metadata,
            ),
        }
    }
}
