//! Retry decisions.
//!
//! # Responsibilities
//! - Classify upstream statuses into success / throttled / client / server
//! - Parse `Retry-After` for 429 responses
//! - Extract a readable error message from an upstream body
//!
//! # Design Decisions
//! - 429 ends the call immediately; the wait is surfaced, never slept on
//! - Other 4xx are not transient and are attempted once
//! - 5xx, network errors and timeouts are retried

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Class of an upstream HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    TooManyRequests,
    ClientError,
    ServerError,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::TooManyRequests,
        500..=599 => StatusClass::ServerError,
        // 1xx/3xx reaching us are not something a retry fixes.
        _ => StatusClass::ClientError,
    }
}

/// Seconds to wait according to a `Retry-After` header value.
///
/// Accepts delta-seconds or an HTTP date; anything else yields `default_secs`.
pub fn parse_retry_after(value: Option<&str>, default_secs: u64) -> u64 {
    let Some(raw) = value.map(str::trim) else {
        return default_secs;
    };
    if let Ok(secs) = raw.parse::<u64>() {
        return secs;
    }
    match DateTime::parse_from_rfc2822(raw) {
        Ok(at) => {
            let wait = at.with_timezone(&Utc) - Utc::now();
            wait.num_seconds().max(0) as u64
        }
        Err(_) => default_secs,
    }
}

/// Best-effort message from an error body.
pub fn error_message(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(text) => truncate(text),
        Value::Object(map) => ["message", "error_description", "error", "detail"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(text)) => Some(truncate(text)),
                Some(Value::Object(inner)) => inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(truncate),
                _ => None,
            })
            .unwrap_or_else(|| truncate(&body.to_string())),
        other => truncate(&other.to_string()),
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
