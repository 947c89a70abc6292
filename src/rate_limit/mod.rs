//! Request budget subsystem.
//!
//! # Data Flow
//! ```text
//! ResilientCaller, before each attempt:
//!     → limiter.rs try_acquire(id, limits)
//!         → window.rs prune (> 24h), count 60s / 3600s / 86400s
//!         → refuse if any configured cap is reached, else record now
//!     → limiter.rs get_remaining_requests → MetricsRecorder gauge
//! ```
//!
//! # Design Decisions
//! - Sliding windows of timestamps, not token buckets: caps mirror upstream contracts
//! - Every attempt consumes budget, successful or not
//! - An unset daily cap is unconstrained
//! - State is process-local; nothing is shared across instances

pub mod limiter;
pub mod window;

pub use limiter::{RateLimiter, RemainingByWindow, UsageStats};
pub use window::{RateWindow, WindowCounts};
