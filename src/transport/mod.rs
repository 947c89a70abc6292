//! Outbound HTTP transport.
//!
//! # Data Flow
//! ```text
//! ResilientCaller / TokenCache
//!     → TransportRequest (method, url, headers, query, body, timeout)
//!     → Transport::request (client.rs: reqwest)
//!     → TransportResponse (status, lower-cased headers, JSON-or-text body)
//! ```
//!
//! # Design Decisions
//! - The trait is the seam: any HTTP client can back a provider
//! - Non-2xx statuses are responses, not errors; classification happens in resilience
//! - Only I/O failures and timeouts surface as `TransportError`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::ReqwestTransport;
pub use reqwest::Method;

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<TransportBody>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    /// Parsed JSON, a JSON string for non-JSON text, or null when empty.
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// I/O-level failure. Always treated as transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Anything that can carry a request to an upstream and bring back a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Parse a raw body: JSON when possible, otherwise a JSON string.
pub(crate) fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
