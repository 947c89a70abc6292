//! Metrics exposition.
//!
//! # Responsibilities
//! - Install the Prometheus exporter when enabled
//! - Mirror recorder updates into the process-wide `metrics` facade
//!
//! # Metrics
//! - `provider_requests_total` (counter): requests by provider, status
//! - `provider_request_duration_seconds` (histogram): upstream latency
//! - `provider_rate_limit_remaining` (gauge): remaining local budget
//! - `provider_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `provider_health` (gauge): 1=reachable, 0=unreachable
//!
//! # Design Decisions
//! - Facade calls are no-ops until a recorder is installed
//! - Labels are provider id and outcome, never request data

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::resilience::CircuitState;

const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("provider_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;

    describe_counter!("provider_requests_total", "Upstream requests by provider and outcome");
    describe_histogram!(
        "provider_request_duration_seconds",
        Unit::Seconds,
        "Latency of successful upstream calls"
    );
    describe_gauge!("provider_rate_limit_remaining", "Remaining local request budget");
    describe_gauge!("provider_circuit_state", "Circuit state: 0=closed, 1=half-open, 2=open");
    describe_gauge!("provider_health", "Last health probe result");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(provider: &str, status: &'static str) {
    counter!(
        "provider_requests_total",
        "provider" => provider.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn record_latency(provider: &str, latency_ms: u64) {
    histogram!("provider_request_duration_seconds", "provider" => provider.to_string())
        .record(latency_ms as f64 / 1000.0);
}

pub fn record_rate_limit_remaining(provider: &str, remaining: u32) {
    gauge!("provider_rate_limit_remaining", "provider" => provider.to_string()).set(remaining as f64);
}

pub fn record_circuit_state(provider: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("provider_circuit_state", "provider" => provider.to_string()).set(value);
}

pub fn record_provider_health(provider: &str, healthy: bool) {
    gauge!("provider_health", "provider" => provider.to_string()).set(if healthy { 1.0 } else { 0.0 });
}
