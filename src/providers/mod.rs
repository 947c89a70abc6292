//! Provider subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → registry.rs get_provider / try_with_fallback(category, op)
//!         → traits.rs Provider (search, get_details, test_connection, ...)
//!             → http.rs HttpProvider → ResilientCaller → Transport
//!         → types.rs ProviderResponse envelope back to the caller
//! ```
//!
//! # Design Decisions
//! - The capability set is a trait chosen at registration time
//! - Expected failures travel in the envelope; the registry never propagates them
//! - Providers without credentials are never selected

pub mod http;
pub mod registry;
pub mod traits;
pub mod types;

pub use http::HttpProvider;
pub use registry::{ProviderRegistry, Registration, DEFAULT_PRIORITY};
pub use traits::{validate_search_params, Provider};
pub use types::{ErrorKind, ProviderError, ProviderResponse, ProviderResult, ResponseMetadata, SearchParams};
