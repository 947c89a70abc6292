//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → Provider::test_connection for every registration
//!     → last result per (category, provider)
//!     → transition logs + provider_health gauge
//! ```
//!
//! # Design Decisions
//! - Observational only: the fallback chain is driven by credentials and
//!   activation, circuit breakers handle failing upstreams
//! - Checks are one unguarded attempt: a dead upstream neither stalls the loop nor opens its circuit

pub mod monitor;

pub use monitor::{ProviderHealth, ProviderHealthMonitor};
