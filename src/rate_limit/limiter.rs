//! Per-dependency request budgets.

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::rate_limit::window::{RateWindow, WindowCounts};

/// Remaining requests per configured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingByWindow {
    pub minute: u32,
    pub hour: u32,
    /// `None` when no daily cap is configured.
    pub day: Option<u32>,
}

/// Raw usage for one dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    #[serde(flatten)]
    pub counts: WindowCounts,
    /// Timestamps currently retained (last 24h).
    pub tracked: usize,
}

/// Sliding-window rate limiter keyed by dependency id.
///
/// Each dependency owns its own `RateWindow`; callers of different
/// dependencies never contend on the same entry.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_window<R>(&self, id: &str, f: impl FnOnce(&mut RateWindow, Instant) -> R) -> R {
        let now = Instant::now();
        let mut entry = self.windows.entry(id.to_string()).or_default();
        let window = entry.value_mut();
        window.prune(now);
        f(window, now)
    }

    /// Whether another request fits every configured window.
    pub fn can_make_request(&self, id: &str, limits: &RateLimitConfig) -> bool {
        self.with_window(id, |window, now| window.counts(now).within(limits))
    }

    /// Record an attempted request. Failed attempts consume budget too.
    pub fn record_request(&self, id: &str) {
        self.with_window(id, |window, now| window.record(now));
    }

    /// Check and record in one step under the dependency's lock.
    pub fn try_acquire(&self, id: &str, limits: &RateLimitConfig) -> bool {
        let allowed = self.with_window(id, |window, now| {
            if window.counts(now).within(limits) {
                window.record(now);
                true
            } else {
                false
            }
        });
        if !allowed {
            tracing::debug!(provider = %id, "Local rate limit reached");
        }
        allowed
    }

    /// Minimum remaining budget across configured windows.
    pub fn get_remaining_requests(&self, id: &str, limits: &RateLimitConfig) -> u32 {
        let remaining = self.get_remaining_by_window(id, limits);
        let min = remaining.minute.min(remaining.hour);
        match remaining.day {
            Some(day) => min.min(day),
            None => min,
        }
    }

    pub fn get_remaining_by_window(&self, id: &str, limits: &RateLimitConfig) -> RemainingByWindow {
        let counts = self.with_window(id, |window, now| window.counts(now));
        RemainingByWindow {
            minute: limits.requests_per_minute.saturating_sub(counts.last_minute),
            hour: limits.requests_per_hour.saturating_sub(counts.last_hour),
            day: limits
                .requests_per_day
                .map(|per_day| per_day.saturating_sub(counts.last_day)),
        }
    }

    pub fn get_usage_stats(&self, id: &str) -> UsageStats {
        self.with_window(id, |window, now| UsageStats {
            counts: window.counts(now),
            tracked: window.len(),
        })
    }

    /// Forget all timestamps for one dependency.
    pub fn reset(&self, id: &str) {
        self.windows.remove(id);
    }

    pub fn reset_all(&self) {
        self.windows.clear();
    }
}
