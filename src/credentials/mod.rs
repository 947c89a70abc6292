//! Credential subsystem.
//!
//! # Data Flow
//! ```text
//! ProviderRegistry (register / refresh)
//!     → source.rs CredentialSource::get_decrypted_credentials(provider_id)
//!     → Provider::set_credentials
//!
//! Provider operation
//!     → auth.rs Authenticator::headers(credentials)
//!         → oauth.rs TokenCache (oauth2 only, single-flight)
//! ```
//!
//! # Design Decisions
//! - Storage and decryption live outside this crate, behind a trait
//! - A failed or empty lookup means "no credentials", never an error to callers
//! - Secret values never reach logs

pub mod auth;
pub mod oauth;
pub mod source;

pub use auth::Authenticator;
pub use oauth::TokenCache;
pub use source::{CredentialError, CredentialSource, Credentials, EnvCredentialSource, StaticCredentialSource};
