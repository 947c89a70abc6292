//! In-memory reliability snapshot per dependency.
//!
//! # Responsibilities
//! - Count requests by outcome and track average latency
//! - Keep the latest rate-limit budget and circuit state
//! - Retain a bounded log of recent outcomes
//!
//! # Design Decisions
//! - Purely observational: nothing reads these numbers to make decisions
//! - One `dashmap` entry per dependency, no global lock
//! - Every update is mirrored to the `metrics` facade for Prometheus

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;
use crate::resilience::CircuitState;

/// Outcomes retained per dependency.
pub const OUTCOME_HISTORY: usize = 100;

const SLOW_REQUEST_MS: u64 = 5000;
const LOW_BUDGET: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Success,
    Error,
    Fallback,
    RateLimited,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
            RequestStatus::Fallback => "fallback",
            RequestStatus::RateLimited => "rate_limited",
        }
    }
}

/// One recorded outcome. Never mutated after recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of one dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub fallback_count: u64,
    pub avg_latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    pub circuit_breaker_state: CircuitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
    pub recent_outcomes: Vec<RequestOutcome>,
}

#[derive(Debug, Default)]
struct DependencyMetrics {
    total_requests: u64,
    success_count: u64,
    error_count: u64,
    fallback_count: u64,
    latency_total_ms: u64,
    latency_samples: u64,
    rate_limit_remaining: Option<u32>,
    circuit_state: CircuitState,
    last_request_at: Option<DateTime<Utc>>,
    outcomes: VecDeque<RequestOutcome>,
}

impl DependencyMetrics {
    fn push_outcome(&mut self, outcome: RequestOutcome) {
        if self.outcomes.len() == OUTCOME_HISTORY {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let avg_latency_ms = if self.latency_samples == 0 {
            0.0
        } else {
            self.latency_total_ms as f64 / self.latency_samples as f64
        };
        MetricsSnapshot {
            total_requests: self.total_requests,
            success_count: self.success_count,
            error_count: self.error_count,
            fallback_count: self.fallback_count,
            avg_latency_ms,
            rate_limit_remaining: self.rate_limit_remaining,
            circuit_breaker_state: self.circuit_state,
            last_request_at: self.last_request_at,
            recent_outcomes: self.outcomes.iter().cloned().collect(),
        }
    }
}

/// Per-dependency counters and gauges.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    entries: DashMap<String, DependencyMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<R>(&self, id: &str, f: impl FnOnce(&mut DependencyMetrics) -> R) -> R {
        let mut entry = self.entries.entry(id.to_string()).or_default();
        f(entry.value_mut())
    }

    pub fn record_request(&self, id: &str, status: RequestStatus) {
        self.record_outcome(id, status, None);
    }

    /// Record a request outcome, with latency when one was measured.
    pub fn record_outcome(&self, id: &str, status: RequestStatus, latency_ms: Option<u64>) {
        let now = Utc::now();
        self.update(id, |m| {
            m.total_requests += 1;
            match status {
                RequestStatus::Success => m.success_count += 1,
                RequestStatus::Error => m.error_count += 1,
                RequestStatus::Fallback => m.fallback_count += 1,
                RequestStatus::RateLimited => {}
            }
            m.last_request_at = Some(now);
            m.push_outcome(RequestOutcome {
                status,
                latency_ms,
                timestamp: now,
            });
        });
        metrics::record_request(id, status.as_str());
        if let Some(ms) = latency_ms {
            self.record_latency(id, ms);
        }
    }

    pub fn record_latency(&self, id: &str, latency_ms: u64) {
        self.update(id, |m| {
            m.latency_total_ms = m.latency_total_ms.saturating_add(latency_ms);
            m.latency_samples += 1;
        });
        if latency_ms > SLOW_REQUEST_MS {
            tracing::warn!(provider = %id, latency_ms, "Slow upstream request");
        }
        metrics::record_latency(id, latency_ms);
    }

    pub fn set_rate_limit_remaining(&self, id: &str, remaining: u32) {
        self.update(id, |m| m.rate_limit_remaining = Some(remaining));
        if remaining < LOW_BUDGET {
            tracing::warn!(provider = %id, remaining, "Rate limit budget running low");
        }
        metrics::record_rate_limit_remaining(id, remaining);
    }

    /// Store the circuit state; the gauge is only touched on change.
    /// Transitions themselves are logged by the breaker.
    pub fn set_circuit_breaker_state(&self, id: &str, state: CircuitState) {
        let previous = self.update(id, |m| std::mem::replace(&mut m.circuit_state, state));
        if previous != state {
            metrics::record_circuit_state(id, state);
        }
    }

    pub fn get_metrics(&self, id: &str) -> Option<MetricsSnapshot> {
        self.entries.get(id).map(|entry| entry.snapshot())
    }

    /// Snapshots for every dependency seen so far, ordered by id.
    pub fn get_all_metrics(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    pub fn reset(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn reset_all(&self) {
        self.entries.clear();
    }
}
