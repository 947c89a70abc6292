//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every upstream attempt with a deadline
//! - Map an elapsed deadline to a retryable transport error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The deadline is per attempt, not per logical call
//! - Dropping the inner future cancels the attempt cleanly

use std::future::Future;
use std::time::Duration;

use crate::transport::{TransportError, TransportResponse};

/// Run one attempt under `timeout`.
pub async fn attempt_with_timeout<F>(timeout: Duration, attempt: F) -> Result<TransportResponse, TransportError>
where
    F: Future<Output = Result<TransportResponse, TransportError>>,
{
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}
