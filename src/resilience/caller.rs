//! Resilient execution of one logical upstream call.
//!
//! # Responsibilities
//! - Gate every call on the circuit breaker and the local request budget
//! - Run attempts under a deadline with exponential backoff between them
//! - Translate upstream statuses into the provider error taxonomy
//! - Report outcomes, latency, budget and circuit state to the recorder
//!
//! # Data Flow
//! ```text
//! execute(endpoint, options)
//!     → circuit_breaker.rs acquire (open → CircuitOpen, no I/O)
//!     → for attempt in 0..=max_retries:
//!         → backoff.rs delay (attempt > 0) → sleep
//!         → RateLimiter::try_acquire (refused → RateLimitExceeded)
//!         → timeouts.rs attempt_with_timeout(Transport::request)
//!         → retries.rs classify_status
//!             2xx → permit.succeed, decode
//!             429 → RateLimited { retry_after }, stop
//!             4xx → Client, stop
//!             5xx / network / timeout → next attempt
//!     → retries exhausted → permit.fail
//!
//! ping(endpoint, headers)
//!     → one attempt under the deadline, nothing else
//! ```
//!
//! # Design Decisions
//! - Expected failures come back inside the envelope, never as `Err` or panic
//! - The circuit sees one outcome per logical call, not one per attempt
//! - 429 and other 4xx are neutral for the circuit
//! - Each attempt consumes rate-limit budget
//! - Successes and throttling are recorded here; errors and fallbacks are
//!   recorded once by the registry that drives the chain
//! - `ping` bypasses the circuit, the budget and the recorder entirely

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{DependencyConfig, ResilienceConfig};
use crate::observability::{MetricsRecorder, RequestStatus};
use crate::providers::types::{ProviderError, ProviderResponse, ProviderResult, ResponseMetadata};
use crate::rate_limit::RateLimiter;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::resilience::retries::{classify_status, error_message, parse_retry_after, StatusClass};
use crate::resilience::timeouts::attempt_with_timeout;
use crate::transport::{Method, Transport, TransportBody, TransportError, TransportRequest, TransportResponse};

/// Header used to correlate a call with upstream logs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared collaborators handed to every caller.
#[derive(Clone)]
pub struct ResilienceContext {
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsRecorder>,
    pub transport: Arc<dyn Transport>,
}

impl ResilienceContext {
    /// Fresh limiter and recorder around `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new()),
            metrics: Arc::new(MetricsRecorder::new()),
            transport,
        }
    }
}

impl std::fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("limiter", &self.limiter)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Per-call request shape.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<TransportBody>,
    pub headers: Vec<(String, String)>,
    /// Overrides the configured retry count for this call only.
    pub max_retries: Option<u32>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            max_retries: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post_json(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(TransportBody::Json(body)),
            ..Self::default()
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Circuit breaker plus retry executor for one dependency.
#[derive(Debug)]
pub struct ResilientCaller {
    dependency: DependencyConfig,
    config: ResilienceConfig,
    backoff: BackoffPolicy,
    breaker: CircuitBreaker,
    ctx: ResilienceContext,
}

impl ResilientCaller {
    pub fn new(dependency: DependencyConfig, config: ResilienceConfig, ctx: &ResilienceContext) -> Self {
        Self {
            backoff: BackoffPolicy::from(&config),
            breaker: CircuitBreaker::new(dependency.id.clone(), (&config).into()),
            dependency,
            config,
            ctx: ctx.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.dependency.id
    }

    pub fn dependency(&self) -> &DependencyConfig {
        &self.dependency
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.ctx.transport
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.ctx.metrics
    }

    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    pub fn remaining_requests(&self) -> u32 {
        self.ctx
            .limiter
            .get_remaining_requests(self.id(), &self.dependency.rate_limit)
    }

    /// Absolute URL for `endpoint` under the dependency's base URL.
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.dependency.base_url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn sync_circuit_state(&self) {
        self.ctx
            .metrics
            .set_circuit_breaker_state(self.id(), self.breaker.state());
    }

    fn sync_remaining(&self, metadata: &mut ResponseMetadata) {
        let remaining = self.remaining_requests();
        metadata.rate_limit_remaining = Some(remaining);
        self.ctx.metrics.set_rate_limit_remaining(self.id(), remaining);
    }

    fn build_request(&self, options: &RequestOptions, url: &str, request_id: &str) -> TransportRequest {
        let mut request = TransportRequest::new(options.method.clone(), url.to_string(), self.config.timeout());
        request.headers = options.headers.clone();
        request
            .headers
            .push((REQUEST_ID_HEADER.to_string(), request_id.to_string()));
        request.query = options.query.clone();
        request.body = options.body.clone();
        request
    }

    /// Single unguarded GET: no retries, no circuit, no budget, no metrics.
    pub async fn ping(&self, endpoint: &str, headers: Vec<(String, String)>) -> ProviderResult<()> {
        let options = RequestOptions::get().headers(headers);
        let request = self.build_request(&options, &self.url_for(endpoint), &Uuid::new_v4().to_string());
        let response = attempt_with_timeout(self.config.timeout(), self.ctx.transport.request(request))
            .await
            .map_err(transport_error)?;
        match classify_status(response.status) {
            StatusClass::Success => Ok(()),
            _ => Err(self.status_error(&response)),
        }
    }

    fn status_error(&self, response: &TransportResponse) -> ProviderError {
        match classify_status(response.status) {
            StatusClass::TooManyRequests => ProviderError::RateLimited {
                provider: self.id().to_string(),
                retry_after_secs: parse_retry_after(
                    response.header("retry-after"),
                    self.config.default_retry_after_secs,
                ),
            },
            StatusClass::ClientError => ProviderError::Client {
                status: response.status,
                message: error_message(&response.body),
            },
            StatusClass::Success | StatusClass::ServerError => ProviderError::Server {
                status: response.status,
                message: error_message(&response.body),
            },
        }
    }

    /// Execute one logical call and decode a 2xx body into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> ProviderResponse<T> {
        let id = self.id();
        let mut metadata = ResponseMetadata::new(id);
        let request_id = Uuid::new_v4().to_string();
        metadata.request_id = Some(request_id.clone());
        metadata.cached = Some(false);

        let Some(permit) = self.breaker.acquire() else {
            tracing::debug!(provider = %id, "Circuit open, skipping call");
            self.sync_circuit_state();
            return ProviderResponse::failure(
                ProviderError::CircuitOpen {
                    provider: id.to_string(),
                },
                metadata,
            );
        };

        let url = self.url_for(endpoint);
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = self.backoff.delay(attempt);
                tracing::debug!(provider = %id, attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }

            if !self.ctx.limiter.try_acquire(id, &self.dependency.rate_limit) {
                self.ctx.metrics.record_request(id, RequestStatus::RateLimited);
                self.sync_remaining(&mut metadata);
                // Budget ran out mid-retry: the call did fail upstream.
                if attempt > 0 {
                    permit.fail();
                    self.sync_circuit_state();
                }
                return ProviderResponse::failure(
                    ProviderError::RateLimitExceeded {
                        provider: id.to_string(),
                    },
                    metadata,
                );
            }

            metadata.attempts = attempt + 1;
            let request = self.build_request(&options, &url, &request_id);

            let started = Instant::now();
            let result = attempt_with_timeout(self.config.timeout(), self.ctx.transport.request(request)).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            self.sync_remaining(&mut metadata);

            let response = match result {
                Ok(response) => response,
                Err(error) => {
                    tracing::debug!(provider = %id, attempt, error = %error, "Attempt failed");
                    last_error = Some(transport_error(error));
                    continue;
                }
            };

            match classify_status(response.status) {
                StatusClass::Success => {
                    permit.succeed();
                    self.sync_circuit_state();
                    return match serde_json::from_value::<T>(response.body) {
                        Ok(data) => {
                            self.ctx
                                .metrics
                                .record_outcome(id, RequestStatus::Success, Some(latency_ms));
                            ProviderResponse::ok(data, metadata)
                        }
                        Err(error) => {
                            self.ctx.metrics.record_latency(id, latency_ms);
                            ProviderResponse::failure(ProviderError::Decode(error.to_string()), metadata)
                        }
                    };
                }
                StatusClass::TooManyRequests => {
                    let error = self.status_error(&response);
                    tracing::warn!(provider = %id, error = %error, "Upstream throttling");
                    drop(permit);
                    self.sync_circuit_state();
                    self.ctx.metrics.record_request(id, RequestStatus::RateLimited);
                    return ProviderResponse::failure(error, metadata);
                }
                StatusClass::ClientError => {
                    tracing::debug!(provider = %id, status = response.status, "Upstream rejected request");
                    drop(permit);
                    self.sync_circuit_state();
                    return ProviderResponse::failure(self.status_error(&response), metadata);
                }
                StatusClass::ServerError => {
                    tracing::debug!(provider = %id, attempt, status = response.status, "Upstream error");
                    last_error = Some(self.status_error(&response));
                }
            }
        }

        permit.fail();
        self.sync_circuit_state();
        let error = last_error.unwrap_or_else(|| ProviderError::Network("no attempt completed".to_string()));
        tracing::warn!(provider = %id, attempts = metadata.attempts, error = %error, "Upstream call failed");
        ProviderResponse::failure(error, metadata)
    }
}

fn transport_error(error: TransportError) -> ProviderError {
    match error {
        TransportError::Timeout(elapsed) => ProviderError::Timeout {
            timeout_ms: elapsed.as_millis() as u64,
        },
        TransportError::Connect(message) | TransportError::Network(message) => ProviderError::Network(message),
    }
}
