//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (caps > 0, timeouts > 0)
//! - Detect duplicate provider registrations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{AppConfig, AuthType, ProviderConfig, ResilienceConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_resilience("resilience", &config.resilience, &mut errors);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new(
            "health_check.interval_secs",
            "must be greater than zero",
        ));
    }

    let mut seen = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        let prefix = format!("providers[{}]", i);
        if !seen.insert((provider.category, provider.id.clone())) {
            errors.push(ValidationError::new(
                format!("{}.id", prefix),
                format!(
                    "duplicate provider '{}' in category '{}'",
                    provider.id, provider.category
                ),
            ));
        }
        validate_provider(&prefix, provider, config, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_provider(
    prefix: &str,
    provider: &ProviderConfig,
    config: &AppConfig,
    errors: &mut Vec<ValidationError>,
) {
    if provider.id.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.id", prefix), "must not be empty"));
    }

    match url::Url::parse(&provider.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            format!("{}.base_url", prefix),
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            format!("{}.base_url", prefix),
            format!("invalid URL '{}': {}", provider.base_url, e),
        )),
    }

    let limits = &provider.rate_limit;
    if limits.requests_per_minute == 0 {
        errors.push(ValidationError::new(
            format!("{}.rate_limit.requests_per_minute", prefix),
            "must be greater than zero",
        ));
    }
    if limits.requests_per_hour == 0 {
        errors.push(ValidationError::new(
            format!("{}.rate_limit.requests_per_hour", prefix),
            "must be greater than zero",
        ));
    }
    if limits.requests_per_day == Some(0) {
        errors.push(ValidationError::new(
            format!("{}.rate_limit.requests_per_day", prefix),
            "must be greater than zero when set",
        ));
    }

    let auth = &provider.authentication;
    match auth.auth_type {
        AuthType::ApiKey if auth.header_name.as_deref().map_or(true, str::is_empty) => {
            errors.push(ValidationError::new(
                format!("{}.authentication.header_name", prefix),
                "required for api_key authentication",
            ));
        }
        AuthType::OAuth2 => match auth.token_url.as_deref() {
            None => errors.push(ValidationError::new(
                format!("{}.authentication.token_url", prefix),
                "required for oauth2 authentication",
            )),
            Some(token_url) if url::Url::parse(token_url).is_err() => {
                errors.push(ValidationError::new(
                    format!("{}.authentication.token_url", prefix),
                    format!("invalid URL '{}'", token_url),
                ));
            }
            Some(_) => {}
        },
        _ => {}
    }

    if let Some(pointer) = &provider.results_pointer {
        if !pointer.is_empty() && !pointer.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}.results_pointer", prefix),
                "JSON pointer must start with '/'",
            ));
        }
    }

    let effective = config.resilience.merged(&provider.resilience);
    validate_resilience(&format!("{}.resilience", prefix), &effective, errors);
}

fn validate_resilience(prefix: &str, resilience: &ResilienceConfig, errors: &mut Vec<ValidationError>) {
    if resilience.timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.timeout_ms", prefix),
            "must be greater than zero",
        ));
    }
    if resilience.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{}.failure_threshold", prefix),
            "must be greater than zero",
        ));
    }
}
