//! Periodic provider health probing.
//!
//! # Responsibilities
//! - Probe every registered provider on a fixed interval
//! - Remember the last result per (category, provider)
//! - Log healthy/unhealthy transitions and export a health gauge

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::config::ProviderCategory;
use crate::observability::metrics;
use crate::providers::ProviderRegistry;
use crate::resilience::CircuitState;

/// Result of the latest probe for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider_id: String,
    pub category: ProviderCategory,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub circuit_state: CircuitState,
    pub checked_at: DateTime<Utc>,
}

/// Observational monitor: results never feed back into provider selection.
pub struct ProviderHealthMonitor {
    registry: Arc<ProviderRegistry>,
    config: HealthCheckConfig,
    results: DashMap<(ProviderCategory, String), ProviderHealth>,
}

impl ProviderHealthMonitor {
    pub fn new(registry: Arc<ProviderRegistry>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            config,
            results: DashMap::new(),
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Provider health checks disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered provider once, concurrently.
    pub async fn check_all(&self) -> Vec<ProviderHealth> {
        let providers = self.registry.providers();
        let probes = providers.iter().map(|provider| async move {
            let result = provider.test_connection().await;
            ProviderHealth {
                provider_id: provider.id().to_string(),
                category: provider.category(),
                healthy: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                circuit_state: provider.circuit_state(),
                checked_at: Utc::now(),
            }
        });

        let mut checked = join_all(probes).await;
        for health in &checked {
            self.record(health.clone());
        }
        checked.sort_by(|a, b| (a.category, &a.provider_id).cmp(&(b.category, &b.provider_id)));
        checked
    }

    fn record(&self, health: ProviderHealth) {
        let key = (health.category, health.provider_id.clone());
        let previous = self.results.insert(key, health.clone());
        let was_healthy = previous.map(|p| p.healthy);

        match (was_healthy, health.healthy) {
            (Some(true), false) | (None, false) => tracing::warn!(
                provider = %health.provider_id,
                category = %health.category,
                error = health.error.as_deref().unwrap_or(""),
                "Provider health check failed"
            ),
            (Some(false), true) => tracing::info!(
                provider = %health.provider_id,
                category = %health.category,
                "Provider recovered"
            ),
            _ => {}
        }
        metrics::record_provider_health(&health.provider_id, health.healthy);
    }

    /// Latest results, ordered by category then provider id.
    pub fn results(&self) -> Vec<ProviderHealth> {
        let mut results: Vec<ProviderHealth> = self
            .results
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by(|a, b| (a.category, &a.provider_id).cmp(&(b.category, &b.provider_id)));
        results
    }
}
