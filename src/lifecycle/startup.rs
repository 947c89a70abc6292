//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared transport, limiter and recorder
//! - Register every configured provider with its credentials
//!
//! # Design Decisions
//! - Fail fast: a transport that cannot be built is fatal
//! - Missing credentials are not fatal; those providers stay out of the chains

use std::sync::Arc;

use thiserror::Error;

use crate::config::AppConfig;
use crate::credentials::{CredentialSource, EnvCredentialSource};
use crate::providers::ProviderRegistry;
use crate::resilience::ResilienceContext;
use crate::transport::{ReqwestTransport, Transport};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Everything a running process shares.
#[derive(Debug)]
pub struct Runtime {
    pub config: AppConfig,
    pub context: ResilienceContext,
    pub registry: Arc<ProviderRegistry>,
}

/// Start with the production transport and environment credentials.
pub async fn start(config: AppConfig) -> Result<Runtime, StartupError> {
    let transport = Arc::new(ReqwestTransport::new()?);
    let credentials = Arc::new(EnvCredentialSource::new(config.credentials.env_prefix.clone()));
    Ok(start_with(config, transport, credentials).await)
}

/// Start with explicit collaborators.
pub async fn start_with(
    config: AppConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
) -> Runtime {
    let context = ResilienceContext::new(transport);
    let registry = ProviderRegistry::from_config(&config, credentials, &context).await;

    let registrations = registry.registrations();
    let usable = registrations
        .iter()
        .filter(|r| r.is_active && r.has_credentials)
        .count();
    tracing::info!(providers = registrations.len(), usable, "Provider registry ready");

    Runtime {
        config,
        context,
        registry: Arc::new(registry),
    }
}
