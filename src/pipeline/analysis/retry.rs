//! Capped exponential backoff as a pure function of (attempt, error).

use std::time::Duration;

use super::CompletionError;

/// Rate-limit responses back off twice as hard as transport failures.
const RATE_LIMIT_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per completion call, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// No waiting between attempts; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before the next attempt after `attempt` (1-based) failed with
    /// `error`, or `None` when the failure must be surfaced.
    pub fn delay_for(&self, attempt: u32, error: &CompletionError) -> Option<Duration> {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return None;
        }

        let exponent = attempt.saturating_sub(1).min(16);
        let mut delay = self.base_delay.saturating_mul(1u32 << exponent);

        if let CompletionError::RateLimited { retry_after, .. } = error {
            delay = delay.saturating_mul(RATE_LIMIT_MULTIPLIER);
            if let Some(hint) = retry_after {
                delay = delay.max(*hint);
            }
        }

        Some(delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}
