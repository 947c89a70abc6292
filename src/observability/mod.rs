//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ResilientCaller / ProviderRegistry / health monitor produce:
//!     → recorder.rs (per-dependency snapshot, queried by CLI and health output)
//!     → metrics.rs (facade counters, gauges, histograms)
//!     → tracing events (circuit transitions, slow requests, low budget)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from the caller to the upstream via `x-request-id`
//! - Metrics are cheap and never gate behavior

pub mod logging;
pub mod metrics;
pub mod recorder;

pub use logging::init_logging;
pub use self::metrics::init_metrics;
pub use recorder::{MetricsRecorder, MetricsSnapshot, RequestOutcome, RequestStatus};
