//! Config-driven HTTP provider.
//!
//! # Responsibilities
//! - Map search / details / health operations onto configured endpoints
//! - Attach authentication headers from the loaded credentials
//! - Pull the result list out of the search response
//!
//! # Design Decisions
//! - Every call goes through the provider's own `ResilientCaller`
//! - Health checks are one unguarded attempt and do not require credentials
//! - Item ids are percent-encoded as a single path segment
//! - A 401 drops any cached OAuth2 token so the next call re-authenticates

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::{AuthType, ProviderCategory, ProviderConfig, ResilienceConfig};
use crate::config::schema::SearchMethod;
use crate::credentials::{Authenticator, Credentials};
use crate::providers::traits::Provider;
use crate::providers::types::{
    ProviderError, ProviderResponse, ProviderResult, ResponseMetadata, SearchParams,
};
use crate::resilience::{CircuitState, RequestOptions, ResilienceContext, ResilientCaller};

pub struct HttpProvider {
    config: ProviderConfig,
    caller: ResilientCaller,
    auth: Authenticator,
    credentials: ArcSwapOption<Credentials>,
}

impl HttpProvider {
    /// Build from its config entry; `defaults` are the global resilience settings.
    pub fn new(config: ProviderConfig, defaults: &ResilienceConfig, ctx: &ResilienceContext) -> Self {
        let resilience = defaults.merged(&config.resilience);
        let auth = Authenticator::new(
            &config.id,
            config.authentication.clone(),
            resilience.timeout(),
            ctx.transport.clone(),
        );
        Self {
            caller: ResilientCaller::new(config.dependency(), resilience, ctx),
            auth,
            config,
            credentials: ArcSwapOption::empty(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn caller(&self) -> &ResilientCaller {
        &self.caller
    }

    async fn auth_headers(&self, required: bool) -> ProviderResult<Vec<(String, String)>> {
        match self.credentials.load_full() {
            Some(credentials) => self.auth.headers(&credentials).await,
            None if required => Err(ProviderError::MissingCredentials(self.config.id.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
        auth_required: bool,
    ) -> ProviderResponse<T> {
        let headers = match self.auth_headers(auth_required).await {
            Ok(headers) => headers,
            Err(error) => {
                tracing::warn!(provider = %self.config.id, error = %error, "Cannot authenticate request");
                return ProviderResponse::failure(error, ResponseMetadata::new(&self.config.id));
            }
        };

        let response = self.caller.execute(endpoint, options.headers(headers)).await;
        if let Some(ProviderError::Client { status: 401, .. }) = response.cause() {
            if self.auth.auth_type() == AuthType::OAuth2 {
                tracing::info!(provider = %self.config.id, "Upstream rejected token, invalidating");
                self.auth.invalidate().await;
            }
        }
        response
    }

    /// Details URL with `item_id` appended as one encoded path segment.
    fn details_url(&self, item_id: &str) -> ProviderResult<String> {
        let base = self.caller.url_for(&self.config.details_path);
        let mut url = Url::parse(&base)
            .map_err(|e| ProviderError::Validation(format!("invalid details url '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Validation(format!("details url '{}' cannot take a path", base)))?
            .pop_if_empty()
            .push(item_id);
        Ok(url.into())
    }

    fn search_options(&self, params: &SearchParams) -> RequestOptions {
        match self.config.search_method {
            SearchMethod::Get => params
                .iter()
                .fold(RequestOptions::get(), |options, (key, value)| {
                    options.query(key.clone(), query_value(value))
                }),
            SearchMethod::Post => RequestOptions::post_json(Value::Object(params.clone())),
        }
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn category(&self) -> ProviderCategory {
        self.config.category
    }

    async fn search(&self, params: &SearchParams) -> ProviderResponse<Vec<Value>> {
        if let Err(error) = self.validate_params(params) {
            return ProviderResponse::failure(error, ResponseMetadata::new(&self.config.id));
        }
        let options = self.search_options(params);
        self.call::<Value>(&self.config.search_path, options, true)
            .await
            .and_then(|raw| self.transform_response(raw))
    }

    async fn get_details(&self, item_id: &str) -> ProviderResponse<Value> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return ProviderResponse::failure(
                ProviderError::Validation("item id must not be empty".to_string()),
                ResponseMetadata::new(&self.config.id),
            );
        }
        let endpoint = match self.details_url(item_id) {
            Ok(endpoint) => endpoint,
            Err(error) => return ProviderResponse::failure(error, ResponseMetadata::new(&self.config.id)),
        };
        self.call(&endpoint, RequestOptions::get(), true).await
    }

    fn transform_response(&self, raw: Value) -> ProviderResult<Vec<Value>> {
        let target = match &self.config.results_pointer {
            Some(pointer) => raw
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| ProviderError::Decode(format!("no value at '{}'", pointer)))?,
            None => raw,
        };
        match target {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ProviderError::Decode(format!(
                "expected a list of results, got {}",
                type_name(&other)
            ))),
        }
    }

    async fn test_connection(&self) -> ProviderResult<()> {
        let headers = self.auth_headers(false).await?;
        self.caller.ping(&self.config.health_path, headers).await
    }

    /// Swap credentials; a cached OAuth2 token is not reused across a change.
    fn set_credentials(&self, credentials: Option<Credentials>) {
        self.credentials.store(credentials.map(Arc::new));
    }

    fn has_credentials(&self) -> bool {
        self.credentials.load().is_some()
    }

    fn circuit_state(&self) -> CircuitState {
        self.caller.circuit_state()
    }
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("id", &self.config.id)
            .field("category", &self.config.category)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::providers::types::ErrorKind;
    use crate::transport::mock::{ScriptedTransport, Step};
    use serde_json::json;

    fn provider_config(search_method: SearchMethod, auth: AuthConfig) -> ProviderConfig {
        toml::from_str::<ProviderConfig>(
            r#"
            id = "skyscan"
            category = "flight"
            base_url = "http://skyscan.test"
            search_path = "/v1/flights"
            results_pointer = "/data/offers"
            "#,
        )
        .map(|mut config| {
            config.search_method = search_method;
            config.authentication = auth;
            config
        })
        .unwrap()
    }

    fn provider(transport: Arc<ScriptedTransport>, config: ProviderConfig) -> HttpProvider {
        let ctx = ResilienceContext::new(transport);
        let defaults = ResilienceConfig {
            max_retries: 1,
            base_delay_ms: 10,
            jitter_ms: 0,
            ..Default::default()
        };
        HttpProvider::new(config, &defaults, &ctx)
    }

    fn flight_params() -> SearchParams {
        match json!({"origin": "LIS", "destination": "JFK", "departure_date": "2026-05-01", "adults": 1}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_sends_query_and_api_key() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(
            200,
            json!({"data": {"offers": [{"id": "o1"}, {"id": "o2"}]}}),
        )]));
        let provider = provider(transport.clone(), provider_config(SearchMethod::Get, AuthConfig::default()));
        provider.set_credentials(Some(Credentials::new().with("api_key", "k")));

        let response = provider.search(&flight_params()).await;
        assert!(response.success);
        assert_eq!(response.data.map(|d| d.len()), Some(2));

        let request = &transport.calls()[0].request;
        assert_eq!(request.url, "http://skyscan.test/v1/flights");
        assert_eq!(request.header("X-Api-Key"), Some("k"));
        assert!(request.query.contains(&("adults".to_string(), "1".to_string())));
        assert!(request.query.contains(&("origin".to_string(), "LIS".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_search_sends_json_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::json(200, json!({"data": {"offers": []}}))]));
        let provider = provider(transport.clone(), provider_config(SearchMethod::Post, AuthConfig::default()));
        provider.set_credentials(Some(Credentials::new().with("api_key", "k")));

        let response = provider.search(&flight_params()).await;
        assert_eq!(response.data, Some(vec![]));
        let request = &transport.calls()[0].request;
        assert_eq!(request.method, crate::transport::Method::POST);
        assert!(matches!(&request.body, Some(crate::transport::TransportBody::Json(body)) if body["origin"] == "LIS"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_params_and_missing_credentials_make_no_calls() {
        let transport = Arc::new(ScriptedTransport::always(Step::status(200)));
        let provider = provider(transport.clone(), provider_config(SearchMethod::Get, AuthConfig::default()));

        let invalid = provider.search(&SearchParams::new()).await;
        assert_eq!(invalid.error_kind, Some(ErrorKind::Validation));

        let unauthenticated = provider.search(&flight_params()).await;
        assert_eq!(
            unauthenticated.cause(),
            Some(&ProviderError::MissingCredentials("skyscan".to_string()))
        );
        assert!(!provider.has_credentials());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_details_encodes_item_id() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::json(200, json!({"id": "a b"})),
            Step::json(200, json!({})),
        ]));
        let provider = provider(transport.clone(), provider_config(SearchMethod::Get, AuthConfig::default()));
        provider.set_credentials(Some(Credentials::new().with("api_key", "k")));

        let response = provider.get_details("a b").await;
        assert_eq!(response.data, Some(json!({"id": "a b"})));
        assert_eq!(transport.calls()[0].request.url, "http://skyscan.test/items/a%20b");

        let _ = provider.get_details("C++ 1/2?").await;
        assert_eq!(transport.calls()[1].request.url, "http://skyscan.test/items/C++%201%2F2%3F");

        let empty = provider.get_details("  ").await;
        assert_eq!(empty.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_is_single_attempt_without_credentials() {
        let transport = Arc::new(ScriptedTransport::always(Step::status(503)));
        let provider = provider(transport.clone(), provider_config(SearchMethod::Get, AuthConfig::default()));

        let result = provider.test_connection().await;
        assert!(matches!(result, Err(ProviderError::Server { status: 503, .. })));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.calls()[0].request.url, "http://skyscan.test/health");
        assert_eq!(transport.calls()[0].request.header("X-Api-Key"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_health_checks_leave_search_path_alone() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::status(503),
            Step::status(503),
            Step::json(200, json!({"data": {"offers": [{"id": "o1"}]}})),
        ]));
        let mut config = provider_config(SearchMethod::Get, AuthConfig::default());
        config.rate_limit.requests_per_minute = 1;
        let ctx = ResilienceContext::new(transport.clone());
        let defaults = ResilienceConfig {
            max_retries: 0,
            failure_threshold: 2,
            ..Default::default()
        };
        let provider = HttpProvider::new(config, &defaults, &ctx);
        provider.set_credentials(Some(Credentials::new().with("api_key", "k")));

        for _ in 0..2 {
            assert!(provider.test_connection().await.is_err());
        }
        assert_eq!(provider.circuit_state(), CircuitState::Closed);
        assert_eq!(provider.caller().circuit_snapshot().failure_count, 0);
        assert_eq!(provider.caller().remaining_requests(), 1);

        let response = provider.search(&flight_params()).await;
        assert!(response.success, "unexpected failure: {:?}", response.error);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_credentials_replace_cached_oauth_token() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::json(200, json!({"access_token": "t1", "expires_in": 3600})),
            Step::json(200, json!({"id": "x"})),
            Step::json(200, json!({"access_token": "t2", "expires_in": 3600})),
            Step::json(200, json!({"id": "x"})),
        ]));
        let auth = AuthConfig {
            auth_type: AuthType::OAuth2,
            header_name: None,
            token_url: Some("http://auth.test/token".to_string()),
            scope: None,
        };
        let provider = provider(transport.clone(), provider_config(SearchMethod::Get, auth));
        provider.set_credentials(Some(Credentials::new().with("client_id", "c").with("client_secret", "old")));
        assert!(provider.get_details("x").await.success);

        provider.set_credentials(Some(Credentials::new().with("client_id", "c").with("client_secret", "new")));
        assert!(provider.get_details("x").await.success);

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2].request.url, "http://auth.test/token");
        assert_eq!(calls[3].request.header("Authorization"), Some("Bearer t2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_invalidates_oauth_token() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::json(200, json!({"access_token": "t1", "expires_in": 3600})),
            Step::status(401),
            Step::json(200, json!({"access_token": "t2", "expires_in": 3600})),
            Step::json(200, json!({"id": "x"})),
        ]));
        let auth = AuthConfig {
            auth_type: AuthType::OAuth2,
            header_name: None,
            token_url: Some("http://auth.test/token".to_string()),
            scope: None,
        };
        let provider = provider(transport.clone(), provider_config(SearchMethod::Get, auth));
        provider.set_credentials(Some(Credentials::new().with("client_id", "c").with("client_secret", "s")));

        let rejected = provider.get_details("x").await;
        assert_eq!(rejected.error_kind, Some(ErrorKind::ClientError));

        let retried = provider.get_details("x").await;
        assert!(retried.success);
        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3].request.header("Authorization"), Some("Bearer t2"));
    }

    #[test]
    fn test_transform_response_shapes() {
        let transport = Arc::new(ScriptedTransport::default());
        let provider = provider(transport, provider_config(SearchMethod::Get, AuthConfig::default()));

        assert_eq!(
            provider.transform_response(json!({"data": {"offers": [1, 2]}})).unwrap(),
            vec![json!(1), json!(2)]
        );
        assert!(matches!(
            provider.transform_response(json!({"data": {}})),
            Err(ProviderError::Decode(_))
        ));
        assert!(matches!(
            provider.transform_response(json!({"data": {"offers": "none"}})),
            Err(ProviderError::Decode(_))
        ));
    }
}
