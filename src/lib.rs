//! Resilience and provider-selection core for calling rate-limited,
//! unreliable third-party travel data providers.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ ProviderRegistry ──▶ Provider (HttpProvider) ──▶ ResilientCaller ──▶ Transport ──▶ upstream
//!                 │  fallback chain        │ credentials            │ circuit breaker
//!                 │  credential gating     │ auth headers           │ rate limiter
//!                 ▼                        ▼                        │ retry / backoff / timeout
//!           MetricsRecorder ◀──────────────────────────────────────┘
//! ```
//!
//! Cross-cutting: `config` (TOML + validation), `observability` (tracing,
//! Prometheus), `health` (periodic probes), `lifecycle` (startup, shutdown).

// Core subsystems
pub mod config;
pub mod providers;
pub mod rate_limit;
pub mod resilience;
pub mod transport;

// Collaborators
pub mod credentials;
pub mod health;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{AppConfig, ProviderCategory};
pub use lifecycle::Shutdown;
pub use observability::MetricsRecorder;
pub use providers::{Provider, ProviderError, ProviderRegistry, ProviderResponse};
pub use rate_limit::RateLimiter;
pub use resilience::{ResilienceContext, ResilientCaller};
