//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ResilienceConfig;

/// Backoff schedule: `base * 2^(attempt-1) + uniform(0, jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base_delay_ms,
            jitter_ms,
        }
    }

    /// Delay before `attempt` (0 = first attempt, no delay).
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if attempt > 0 && self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.exponential(attempt)
            .saturating_add(Duration::from_millis(jitter))
    }

    /// Deterministic part of the delay.
    pub fn exponential(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl From<&ResilienceConfig> for BackoffPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self::new(config.base_delay_ms, config.jitter_ms)
    }
}
