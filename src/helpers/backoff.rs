use std::time::Duration;

use rand::Rng;

use crate::constants::{DEFAULT_READ_RETRIES, READ_BACKOFF_BASE_MS, READ_BACKOFF_MAX_JITTER_MS};

/// Bounded exponential backoff for read fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_READ_RETRIES,
            base_delay: Duration::from_millis(READ_BACKOFF_BASE_MS),
            max_jitter: Duration::from_millis(READ_BACKOFF_MAX_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt - 1) plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);

        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}
