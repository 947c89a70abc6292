//! Sliding window of request timestamps for one dependency.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(3600);
pub const DAY: Duration = Duration::from_secs(86_400);

/// Request counts inside each tracked window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub last_minute: u32,
    pub last_hour: u32,
    pub last_day: u32,
}

impl WindowCounts {
    /// True when no configured cap has been reached.
    pub fn within(&self, limits: &RateLimitConfig) -> bool {
        if self.last_minute >= limits.requests_per_minute {
            return false;
        }
        if self.last_hour >= limits.requests_per_hour {
            return false;
        }
        match limits.requests_per_day {
            Some(per_day) => self.last_day < per_day,
            None => true,
        }
    }
}

/// Ordered timestamps of attempted requests, oldest first.
#[derive(Debug, Default)]
pub struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop timestamps that fell out of the 24h window.
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= DAY {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    /// Count requests per window. Assumes `prune` ran for the same `now`.
    pub fn counts(&self, now: Instant) -> WindowCounts {
        let mut counts = WindowCounts {
            last_day: self.timestamps.len() as u32,
            ..Default::default()
        };
        // Newest first; stop once we leave the hour window.
        for ts in self.timestamps.iter().rev() {
            let age = now.saturating_duration_since(*ts);
            if age >= HOUR {
                break;
            }
            counts.last_hour += 1;
            if age < MINUTE {
                counts.last_minute += 1;
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
