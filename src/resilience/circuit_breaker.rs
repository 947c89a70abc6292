//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: reset timeout elapsed (checked lazily on access)
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering recovering upstream)
//! - Any success resets the failure count

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::ResilienceConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
        }
    }
}

/// Point-in-time view for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Milliseconds since the circuit last opened, while not closed.
    pub open_for_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn transition(&mut self, id: &str, to: CircuitState) {
        let from = self.state;
        self.state = to;
        match to {
            CircuitState::Open => {
                self.opened_at = Some(Instant::now());
                tracing::warn!(provider = %id, %from, failures = self.failure_count, "Circuit opened");
            }
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                tracing::info!(provider = %id, %from, "Circuit half-open, admitting probe");
            }
            CircuitState::Closed => {
                self.failure_count = 0;
                self.opened_at = None;
                tracing::info!(provider = %id, %from, "Circuit closed");
            }
        }
    }

    /// Lazy Open → Half-Open once the cooldown has passed.
    fn check_reset(&mut self, id: &str, reset_timeout: Duration) {
        if self.state != CircuitState::Open {
            return;
        }
        if let Some(opened_at) = self.opened_at {
            if opened_at.elapsed() > reset_timeout {
                self.transition(id, CircuitState::HalfOpen);
            }
        }
    }
}

/// Circuit breaker owned by one `ResilientCaller`.
#[derive(Debug)]
pub struct CircuitBreaker {
    id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            id: id.into(),
            config,
            inner: Mutex::new(BreakerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    /// Current state, applying the cooldown check first.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        inner.check_reset(&self.id, self.config.reset_timeout);
        inner.state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// True while calls are being refused.
    pub fn is_open(&self) -> bool {
        let mut inner = self.lock();
        inner.check_reset(&self.id, self.config.reset_timeout);
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => true,
            CircuitState::HalfOpen => inner.probe_in_flight,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.lock();
        inner.check_reset(&self.id, self.config.reset_timeout);
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            open_for_ms: inner
                .opened_at
                .map(|at| at.elapsed().as_millis().min(u64::MAX as u128) as u64),
        }
    }

    /// Ask to make a call. `None` means fail fast.
    ///
    /// The returned permit must be settled with `succeed` or `fail`; dropping
    /// it unsettled is a neutral outcome that only releases a half-open probe.
    pub fn acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();
        inner.check_reset(&self.id, self.config.reset_timeout);
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => return None,
            CircuitState::HalfOpen if inner.probe_in_flight => return None,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                true
            }
        };
        Some(CallPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => inner.transition(&self.id, CircuitState::Closed),
            // Late success from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.transition(&self.id, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.failure_count += 1;
                inner.transition(&self.id, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn on_neutral(&self, probe: bool) {
        if probe {
            self.lock().probe_in_flight = false;
        }
    }
}

/// RAII permission to perform one logical call.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_neutral(self.probe);
        }
    }
}
