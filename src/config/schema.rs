//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the provider core.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Default resilience settings applied to every provider.
    pub resilience: ResilienceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Periodic provider probing.
    pub health_check: HealthCheckConfig,

    /// Where credentials are loaded from.
    pub credentials: CredentialsConfig,

    /// Upstream provider definitions.
    pub providers: Vec<ProviderConfig>,
}

/// Business category a provider serves. Fallback chains are computed per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCategory {
    Flight,
    Hotel,
    Transfer,
}

impl ProviderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderCategory::Flight => "flight",
            ProviderCategory::Hotel => "hotel",
            ProviderCategory::Transfer => "transfer",
        }
    }
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flight" => Ok(ProviderCategory::Flight),
            "hotel" => Ok(ProviderCategory::Hotel),
            "transfer" => Ok(ProviderCategory::Transfer),
            other => Err(format!("unknown provider category '{}'", other)),
        }
    }
}

/// Request budget for one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests in any 60 second window.
    pub requests_per_minute: u32,

    /// Maximum requests in any 3600 second window.
    pub requests_per_hour: u32,

    /// Optional cap over 24 hours. Unset means unconstrained.
    pub requests_per_day: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
            requests_per_day: None,
        }
    }
}

/// How requests to a dependency are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum AuthType {
    #[serde(rename = "api_key")]
    ApiKey,
    #[serde(rename = "bearer")]
    Bearer,
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "oauth2")]
    OAuth2,
}

/// Authentication settings for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,

    /// Header carrying the API key (api_key only).
    pub header_name: Option<String>,

    /// Token endpoint for the client-credentials grant (oauth2 only).
    pub token_url: Option<String>,

    /// Optional scope requested with the token (oauth2 only).
    pub scope: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::ApiKey,
            header_name: Some("X-Api-Key".to_string()),
            token_url: None,
            scope: None,
        }
    }
}

/// Immutable description of one upstream dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyConfig {
    pub id: String,
    pub category: ProviderCategory,
    pub base_url: String,
    pub rate_limit: RateLimitConfig,
    pub authentication: AuthConfig,
}

/// Retry, timeout and circuit breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound of the uniform random jitter added to each backoff.
    pub jitter_ms: u64,

    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Consecutive failed calls before the circuit opens.
    pub failure_threshold: u32,

    /// Cooldown before an open circuit admits a probe, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Used when a 429 carries no parseable Retry-After header.
    pub default_retry_after_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            jitter_ms: 500,
            timeout_ms: 10_000,
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            default_retry_after_secs: 30,
        }
    }
}

impl ResilienceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Apply per-provider overrides on top of these defaults.
    pub fn merged(&self, overrides: &ResilienceOverrides) -> Self {
        Self {
            max_retries: overrides.max_retries.unwrap_or(self.max_retries),
            base_delay_ms: overrides.base_delay_ms.unwrap_or(self.base_delay_ms),
            jitter_ms: overrides.jitter_ms.unwrap_or(self.jitter_ms),
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
            failure_threshold: overrides.failure_threshold.unwrap_or(self.failure_threshold),
            reset_timeout_ms: overrides.reset_timeout_ms.unwrap_or(self.reset_timeout_ms),
            default_retry_after_secs: overrides
                .default_retry_after_secs
                .unwrap_or(self.default_retry_after_secs),
        }
    }
}

/// Per-provider resilience settings. Unset fields inherit the global defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceOverrides {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub default_retry_after_secs: Option<u64>,
}

/// HTTP method used for the search endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchMethod {
    #[default]
    Get,
    Post,
}

/// One upstream provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider identifier within its category.
    pub id: String,

    pub category: ProviderCategory,

    /// Base URL, e.g. "https://api.example.com".
    pub base_url: String,

    /// Fallback priority (lower = tried first).
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Whether the provider starts active.
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub authentication: AuthConfig,

    #[serde(default)]
    pub resilience: ResilienceOverrides,

    /// Path of the search endpoint.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    #[serde(default)]
    pub search_method: SearchMethod,

    /// Path prefix of the details endpoint; the item id is appended.
    #[serde(default = "default_details_path")]
    pub details_path: String,

    /// Path requested by `test_connection`.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// JSON pointer to the result list inside the search response.
    #[serde(default)]
    pub results_pointer: Option<String>,
}

impl ProviderConfig {
    /// The immutable dependency description for this provider.
    pub fn dependency(&self) -> DependencyConfig {
        DependencyConfig {
            id: self.id.clone(),
            category: self.category,
            base_url: self.base_url.clone(),
            rate_limit: self.rate_limit,
            authentication: self.authentication.clone(),
        }
    }
}

pub(crate) fn default_priority() -> u32 {
    100
}

fn default_active() -> bool {
    true
}

fn default_search_path() -> String {
    "/search".to_string()
}

fn default_details_path() -> String {
    "/items".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic probing.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Credential source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Prefix of the environment variables holding provider secrets.
    pub env_prefix: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            env_prefix: "PROVIDER".to_string(),
        }
    }
}
