//! Provider registry with credential gating and fallback chains.
//!
//! # Fallback Chain Flow
//!
//! ```text
//! try_with_fallback(Hotel, op)
//!         │
//!         ▼
//!   chain = [roomly (p1), bedbank (p1), staywise (p5)]   ← active && has_credentials,
//!         │                                                 priority asc, id asc
//!         ▼
//!   op(roomly)   ── Err ──► record error, warn, next
//!         │
//!         ▼
//!   op(bedbank)  ── Ok ───► record fallback, return Some(result)
//!
//!   chain empty / every op failed ──► None (logged as exhausted)
//! ```
//!
//! # Design Decisions
//! - Registrations live in a `DashMap` keyed by (category, provider id)
//! - Chains are recomputed in full and published through `ArcSwap`, never patched
//! - Credential and provider failures are logged and absorbed, never returned
//! - Fallback is strictly sequential

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::Serialize;

use crate::config::{AppConfig, ProviderCategory};
use crate::credentials::{CredentialSource, Credentials};
use crate::observability::{MetricsRecorder, RequestStatus};
use crate::providers::http::HttpProvider;
use crate::providers::traits::Provider;
use crate::providers::types::ProviderResult;
use crate::resilience::{CircuitState, ResilienceContext};

/// Priority used by [`ProviderRegistry::register`].
pub const DEFAULT_PRIORITY: u32 = 100;

type RegistrationKey = (ProviderCategory, String);

/// Status of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub provider_id: String,
    pub category: ProviderCategory,
    pub priority: u32,
    pub is_active: bool,
    pub has_credentials: bool,
    pub circuit_state: CircuitState,
}

struct Entry {
    provider: Arc<dyn Provider>,
    priority: u32,
    is_active: bool,
    has_credentials: bool,
}

impl Entry {
    fn selectable(&self) -> bool {
        self.is_active && self.has_credentials
    }
}

pub struct ProviderRegistry {
    entries: DashMap<RegistrationKey, Entry>,
    chains: ArcSwap<HashMap<ProviderCategory, Vec<String>>>,
    credentials: Arc<dyn CredentialSource>,
    metrics: Arc<MetricsRecorder>,
}

impl ProviderRegistry {
    pub fn new(credentials: Arc<dyn CredentialSource>, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            entries: DashMap::new(),
            chains: ArcSwap::from_pointee(HashMap::new()),
            credentials,
            metrics,
        }
    }

    /// Build an `HttpProvider` for every configured provider and register it.
    pub async fn from_config(
        config: &AppConfig,
        credentials: Arc<dyn CredentialSource>,
        ctx: &ResilienceContext,
    ) -> Self {
        let registry = Self::new(credentials, ctx.metrics.clone());
        for provider_config in &config.providers {
            let provider = HttpProvider::new(provider_config.clone(), &config.resilience, ctx);
            registry
                .insert_registration(Arc::new(provider), provider_config.priority, provider_config.active)
                .await;
        }
        registry
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Resolve credentials; any failure means "none".
    async fn load_credentials(&self, provider_id: &str) -> Option<Credentials> {
        match self.credentials.get_decrypted_credentials(provider_id).await {
            Ok(Some(credentials)) => Some(credentials),
            Ok(None) => {
                tracing::warn!(provider = %provider_id, "No credentials found, provider excluded from selection");
                None
            }
            Err(error) => {
                tracing::warn!(provider = %provider_id, error = %error, "Failed to load credentials, provider excluded from selection");
                None
            }
        }
    }

    /// Register with the default priority.
    pub async fn register(&self, provider: Arc<dyn Provider>) {
        self.register_provider(provider, DEFAULT_PRIORITY).await;
    }

    /// Register `provider` under its category. Re-registering the same
    /// (category, id) replaces the previous instance.
    pub async fn register_provider(&self, provider: Arc<dyn Provider>, priority: u32) {
        self.insert_registration(provider, priority, true).await;
    }

    async fn insert_registration(&self, provider: Arc<dyn Provider>, priority: u32, is_active: bool) {
        let id = provider.id().to_string();
        let category = provider.category();

        let credentials = self.load_credentials(&id).await;
        let has_credentials = credentials.is_some();
        provider.set_credentials(credentials);

        self.entries.insert(
            (category, id.clone()),
            Entry {
                provider,
                priority,
                is_active,
                has_credentials,
            },
        );
        tracing::info!(provider = %id, %category, priority, is_active, has_credentials, "Provider registered");
        self.rebuild_chain(category);
    }

    fn compute_chain(&self, category: ProviderCategory) -> Vec<String> {
        let mut selectable: Vec<(u32, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == category && entry.value().selectable())
            .map(|entry| (entry.value().priority, entry.key().1.clone()))
            .collect();
        selectable.sort();
        selectable.into_iter().map(|(_, id)| id).collect()
    }

    fn rebuild_chain(&self, category: ProviderCategory) {
        self.chains.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(category, self.compute_chain(category));
            next
        });
        tracing::debug!(%category, chain = ?self.get_fallback_chain(category), "Fallback chain rebuilt");
    }

    /// A selectable provider: the named one, or the head of the chain.
    pub fn get_provider(&self, category: ProviderCategory, name: Option<&str>) -> Option<Arc<dyn Provider>> {
        match name {
            Some(name) => self
                .entries
                .get(&(category, name.to_string()))
                .filter(|entry| entry.selectable())
                .map(|entry| entry.provider.clone()),
            None => {
                let head = self.get_fallback_chain(category).into_iter().next()?;
                self.entries
                    .get(&(category, head))
                    .map(|entry| entry.provider.clone())
            }
        }
    }

    pub fn get_fallback_chain(&self, category: ProviderCategory) -> Vec<String> {
        self.chains.load().get(&category).cloned().unwrap_or_default()
    }

    /// Run `operation` against the chain until one provider succeeds.
    ///
    /// Returns `None` when the chain is empty or every provider failed.
    pub async fn try_with_fallback<T, F, Fut>(&self, category: ProviderCategory, operation: F) -> Option<T>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let chain = self.get_fallback_chain(category);
        if chain.is_empty() {
            tracing::error!(%category, "No providers available");
            return None;
        }

        for (position, id) in chain.iter().enumerate() {
            let Some(provider) = self
                .entries
                .get(&(category, id.clone()))
                .map(|entry| entry.provider.clone())
            else {
                continue;
            };

            let attempt = AssertUnwindSafe(async { operation(provider).await })
                .catch_unwind()
                .await;
            match attempt {
                Ok(Ok(value)) => {
                    if position > 0 {
                        self.metrics.record_request(id, RequestStatus::Fallback);
                        tracing::warn!(provider = %id, %category, position, "Served by fallback provider");
                    }
                    return Some(value);
                }
                Ok(Err(error)) => {
                    self.metrics.record_request(id, RequestStatus::Error);
                    tracing::warn!(provider = %id, %category, error = %error, "Provider failed, trying next");
                }
                Err(_) => {
                    self.metrics.record_request(id, RequestStatus::Error);
                    tracing::error!(provider = %id, %category, "Provider operation panicked, trying next");
                }
            }
        }

        tracing::error!(%category, tried = chain.len(), "All providers exhausted");
        None
    }

    fn matching_keys(&self, provider_id: &str) -> Vec<RegistrationKey> {
        self.entries
            .iter()
            .filter(|entry| entry.key().1 == provider_id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Reload credentials for every registration of `provider_id`.
    ///
    /// Returns the number of registrations updated.
    pub async fn refresh_credentials(&self, provider_id: &str) -> usize {
        let keys = self.matching_keys(provider_id);
        if keys.is_empty() {
            return 0;
        }

        let credentials = self.load_credentials(provider_id).await;
        let mut updated = 0;
        for key in &keys {
            if let Some(mut entry) = self.entries.get_mut(key) {
                entry.has_credentials = credentials.is_some();
                entry.provider.set_credentials(credentials.clone());
                updated += 1;
            }
        }
        tracing::info!(provider = %provider_id, has_credentials = credentials.is_some(), "Credentials refreshed");
        self.rebuild_categories(&keys);
        updated
    }

    /// Toggle selection for every registration of `provider_id`.
    ///
    /// Returns the number of registrations updated.
    pub fn set_provider_active(&self, provider_id: &str, active: bool) -> usize {
        let keys = self.matching_keys(provider_id);
        for key in &keys {
            if let Some(mut entry) = self.entries.get_mut(key) {
                entry.is_active = active;
            }
        }
        if !keys.is_empty() {
            tracing::info!(provider = %provider_id, active, "Provider activation changed");
            self.rebuild_categories(&keys);
        }
        keys.len()
    }

    fn rebuild_categories(&self, keys: &[RegistrationKey]) {
        let mut categories: Vec<ProviderCategory> = keys.iter().map(|(category, _)| *category).collect();
        categories.sort();
        categories.dedup();
        for category in categories {
            self.rebuild_chain(category);
        }
    }

    /// Every registration, ordered by category, priority, then id.
    pub fn registrations(&self) -> Vec<Registration> {
        let mut registrations: Vec<Registration> = self
            .entries
            .iter()
            .map(|entry| {
                let (category, id) = entry.key();
                let value = entry.value();
                Registration {
                    provider_id: id.clone(),
                    category: *category,
                    priority: value.priority,
                    is_active: value.is_active,
                    has_credentials: value.has_credentials,
                    circuit_state: value.provider.circuit_state(),
                }
            })
            .collect();
        registrations.sort_by(|a, b| {
            (a.category, a.priority, &a.provider_id).cmp(&(b.category, b.priority, &b.provider_id))
        });
        registrations
    }

    /// Every registered instance, selectable or not.
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.entries
            .iter()
            .map(|entry| entry.value().provider.clone())
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("registrations", &self.entries.len())
            .field("chains", &self.chains.load_full())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialSource;
    use crate::providers::types::{ProviderError, ProviderResponse, ResponseMetadata, SearchParams};
    use crate::transport::mock::{ScriptedTransport, Step};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider whose search answers with a fixed outcome.
    struct StubProvider {
        id: String,
        category: ProviderCategory,
        outcome: Result<Value, ProviderError>,
        calls: AtomicUsize,
        credentials: arc_swap::ArcSwapOption<Credentials>,
    }

    impl StubProvider {
        fn ok(id: &str, value: Value) -> Arc<Self> {
            Self::build(id, Ok(value))
        }

        fn failing(id: &str) -> Arc<Self> {
            Self::build(
                id,
                Err(ProviderError::Server {
                    status: 503,
                    message: "down".into(),
                }),
            )
        }

        fn build(id: &str, outcome: Result<Value, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                category: ProviderCategory::Hotel,
                outcome,
                calls: AtomicUsize::new(0),
                credentials: arc_swap::ArcSwapOption::empty(),
            })
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn category(&self) -> ProviderCategory {
            self.category
        }

        async fn search(&self, _params: &SearchParams) -> ProviderResponse<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let metadata = ResponseMetadata::new(&self.id);
            match &self.outcome {
                Ok(value) => ProviderResponse::ok(vec![value.clone()], metadata),
                Err(error) => ProviderResponse::failure(error.clone(), metadata),
            }
        }

        async fn get_details(&self, _item_id: &str) -> ProviderResponse<Value> {
            ProviderResponse::ok(Value::Null, ResponseMetadata::new(&self.id))
        }

        fn transform_response(&self, raw: Value) -> ProviderResult<Vec<Value>> {
            Ok(vec![raw])
        }

        async fn test_connection(&self) -> ProviderResult<()> {
            Ok(())
        }

        fn set_credentials(&self, credentials: Option<Credentials>) {
            self.credentials.store(credentials.map(Arc::new));
        }

        fn has_credentials(&self) -> bool {
            self.credentials.load().is_some()
        }
    }

    fn creds() -> Credentials {
        Credentials::new().with("api_key", "k")
    }

    fn registry(source: StaticCredentialSource) -> (ProviderRegistry, Arc<StaticCredentialSource>) {
        let source = Arc::new(source);
        let registry = ProviderRegistry::new(source.clone(), Arc::new(MetricsRecorder::new()));
        (registry, source)
    }

    async fn search(provider: Arc<dyn Provider>) -> ProviderResult<Vec<Value>> {
        provider.search(&SearchParams::new()).await.into_result()
    }

    #[tokio::test]
    async fn test_chain_order_and_tie_break() {
        let (registry, _) = registry(
            StaticCredentialSource::new()
                .with("beta", creds())
                .with("alpha", creds())
                .with("gamma", creds()),
        );
        registry.register_provider(StubProvider::ok("gamma", json!(3)), 2).await;
        registry.register_provider(StubProvider::ok("beta", json!(2)), 1).await;
        registry.register_provider(StubProvider::ok("alpha", json!(1)), 1).await;

        assert_eq!(
            registry.get_fallback_chain(ProviderCategory::Hotel),
            vec!["alpha", "beta", "gamma"]
        );
        assert!(registry.get_fallback_chain(ProviderCategory::Flight).is_empty());

        let head = registry.get_provider(ProviderCategory::Hotel, None).unwrap();
        assert_eq!(head.id(), "alpha");
    }

    #[tokio::test]
    async fn test_credential_gating_and_refresh() {
        let (registry, source) = registry(StaticCredentialSource::new().with("alpha", creds()));
        source.fail("beta", "vault sealed");
        let beta = StubProvider::ok("beta", json!("b"));
        registry.register_provider(StubProvider::ok("alpha", json!("a")), 5).await;
        registry.register_provider(beta.clone(), 1).await;

        assert_eq!(registry.get_fallback_chain(ProviderCategory::Hotel), vec!["alpha"]);
        assert!(registry.get_provider(ProviderCategory::Hotel, Some("beta")).is_none());
        assert!(!beta.has_credentials());

        source.insert("beta", creds());
        assert_eq!(registry.refresh_credentials("beta").await, 1);
        assert_eq!(registry.get_fallback_chain(ProviderCategory::Hotel), vec!["beta", "alpha"]);
        assert!(beta.has_credentials());
        assert!(registry.get_provider(ProviderCategory::Hotel, Some("beta")).is_some());

        assert_eq!(registry.refresh_credentials("unknown").await, 0);
    }

    #[tokio::test]
    async fn test_fallback_records_error_then_fallback() {
        let (registry, _) = registry(
            StaticCredentialSource::new()
                .with("primary", creds())
                .with("backup", creds()),
        );
        let primary = StubProvider::failing("primary");
        let backup = StubProvider::ok("backup", json!({"hotel": "Avenida"}));
        registry.register_provider(primary.clone(), 1).await;
        registry.register_provider(backup.clone(), 2).await;

        let result = registry.try_with_fallback(ProviderCategory::Hotel, search).await;
        assert_eq!(result, Some(vec![json!({"hotel": "Avenida"})]));

        let metrics = registry.metrics();
        assert_eq!(metrics.get_metrics("primary").unwrap().error_count, 1);
        assert_eq!(metrics.get_metrics("backup").unwrap().fallback_count, 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_records_no_fallback() {
        let (registry, _) = registry(
            StaticCredentialSource::new()
                .with("primary", creds())
                .with("backup", creds()),
        );
        let backup = StubProvider::ok("backup", json!(2));
        registry.register_provider(StubProvider::ok("primary", json!(1)), 1).await;
        registry.register_provider(backup.clone(), 2).await;

        let result = registry.try_with_fallback(ProviderCategory::Hotel, search).await;
        assert_eq!(result, Some(vec![json!(1)]));
        assert!(registry.metrics().get_metrics("primary").is_none());
        assert_eq!(backup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_and_empty_chain_return_none() {
        let (registry, _) = registry(StaticCredentialSource::new().with("only", creds()));
        assert_eq!(
            registry
                .try_with_fallback(ProviderCategory::Hotel, search)
                .await,
            None
        );

        registry.register(StubProvider::failing("only")).await;
        assert_eq!(
            registry
                .try_with_fallback(ProviderCategory::Hotel, search)
                .await,
            None
        );
        assert_eq!(registry.metrics().get_metrics("only").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_panicking_operation_is_contained() {
        let (registry, _) = registry(
            StaticCredentialSource::new()
                .with("primary", creds())
                .with("backup", creds()),
        );
        registry.register_provider(StubProvider::ok("primary", json!(1)), 1).await;
        registry.register_provider(StubProvider::ok("backup", json!(2)), 2).await;

        let result = registry
            .try_with_fallback(ProviderCategory::Hotel, |provider| async move {
                if provider.id() == "primary" {
                    panic!("bad transform");
                }
                Ok(provider.id().to_string())
            })
            .await;
        assert_eq!(result.as_deref(), Some("backup"));
    }

    fn hotel_config() -> crate::config::AppConfig {
        crate::config::parse_config(
            r#"
            [resilience]
            max_retries = 0
            jitter_ms = 0

            [[providers]]
            id = "primary"
            category = "hotel"
            base_url = "http://primary.test"
            priority = 1
            results_pointer = "/hotels"

            [[providers]]
            id = "backup"
            category = "hotel"
            base_url = "http://backup.test"
            priority = 2
            results_pointer = "/hotels"

            [[providers]]
            id = "dormant"
            category = "hotel"
            base_url = "http://dormant.test"
            priority = 0
            active = false
            "#,
        )
        .unwrap()
    }

    fn hotel_params() -> SearchParams {
        match json!({"location": "Porto", "check_in": "2026-08-10", "check_out": "2026-08-12"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_provider_failure_counted_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::status(503),
            Step::json(200, json!({"hotels": [{"name": "Avenida"}]})),
        ]));
        let ctx = ResilienceContext::new(transport.clone());
        let source = Arc::new(
            StaticCredentialSource::new()
                .with("primary", creds())
                .with("backup", creds())
                .with("dormant", creds()),
        );
        let registry = ProviderRegistry::from_config(&hotel_config(), source, &ctx).await;

        let result = registry
            .try_with_fallback(ProviderCategory::Hotel, |provider| async move {
                provider.search(&hotel_params()).await.into_result()
            })
            .await;
        assert_eq!(result, Some(vec![json!({"name": "Avenida"})]));
        assert_eq!(transport.call_count(), 2);

        let primary = registry.metrics().get_metrics("primary").unwrap();
        assert_eq!(primary.error_count, 1);
        assert_eq!(primary.total_requests, 1);
        let backup = registry.metrics().get_metrics("backup").unwrap();
        assert_eq!(backup.success_count, 1);
        assert_eq!(backup.fallback_count, 1);
    }

    #[tokio::test]
    async fn test_inactive_config_entry_never_joins_chain() {
        let ctx = ResilienceContext::new(Arc::new(ScriptedTransport::default()));
        let source = Arc::new(
            StaticCredentialSource::new()
                .with("primary", creds())
                .with("backup", creds())
                .with("dormant", creds()),
        );
        let registry = ProviderRegistry::from_config(&hotel_config(), source, &ctx).await;

        assert_eq!(
            registry.get_fallback_chain(ProviderCategory::Hotel),
            vec!["primary", "backup"]
        );
        let dormant = registry
            .registrations()
            .into_iter()
            .find(|r| r.provider_id == "dormant")
            .unwrap();
        assert!(!dormant.is_active);
        assert!(dormant.has_credentials);

        registry.set_provider_active("dormant", true);
        assert_eq!(
            registry.get_fallback_chain(ProviderCategory::Hotel),
            vec!["dormant", "primary", "backup"]
        );
    }

    #[tokio::test]
    async fn test_activation_toggle_and_registrations() {
        let (registry, _) = registry(
            StaticCredentialSource::new()
                .with("alpha", creds())
                .with("beta", creds()),
        );
        registry.register_provider(StubProvider::ok("alpha", json!(1)), 1).await;
        registry.register(StubProvider::ok("beta", json!(2))).await;

        assert_eq!(registry.set_provider_active("alpha", false), 1);
        assert_eq!(registry.get_fallback_chain(ProviderCategory::Hotel), vec!["beta"]);
        assert!(registry.get_provider(ProviderCategory::Hotel, Some("alpha")).is_none());

        let registrations = registry.registrations();
        assert_eq!(registrations.len(), 2);
        assert_eq!(registrations[0].provider_id, "alpha");
        assert!(!registrations[0].is_active);
        assert_eq!(registrations[1].priority, DEFAULT_PRIORITY);

        registry.set_provider_active("alpha", true);
        assert_eq!(registry.get_fallback_chain(ProviderCategory::Hotel), vec!["alpha", "beta"]);
        assert_eq!(registry.providers().len(), 2);
    }
}
