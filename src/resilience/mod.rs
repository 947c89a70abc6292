//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider operation:
//!     → caller.rs (one logical call)
//!         → circuit_breaker.rs (fail fast while open, single half-open probe)
//!         → backoff.rs (exponential delay + jitter between attempts)
//!         → timeouts.rs (per-attempt deadline)
//!         → retries.rs (status classification, Retry-After)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - Only transient failures (5xx, network, timeout) are retried
//! - Circuit breaker prevents hammering a failing upstream

pub mod backoff;
pub mod caller;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffPolicy;
pub use caller::{RequestOptions, ResilienceContext, ResilientCaller, REQUEST_ID_HEADER};
pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
