//! Retry schedules shared by the network handler and server reconnects.

use std::time::Duration;

/// Longest delay any schedule will produce.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt`: 1s, 2s, 3s, ...
    Linear,
    /// `base * 2^(attempt - 1)`: 1s, 2s, 4s, ...
    Exponential,
}

/// A bounded number of attempts with a delay before each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay to wait before `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.base_delay.checked_mul(attempt),
            Backoff::Exponential => 2u32
                .checked_pow(attempt - 1)
                .and_then(|factor| self.base_delay.checked_mul(factor)),
        };
        delay.unwrap_or(MAX_DELAY).min(MAX_DELAY)
    }

    /// Attempt numbers, starting at 1.
    pub fn attempts(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.max_attempts
    }

    /// Sleep for the delay that precedes `attempt`.
    pub async fn wait(&self, attempt: u32) {
        tokio::time::sleep(self.delay_for(attempt)).await;
    }
}
