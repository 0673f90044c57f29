//! Bounded retry with exponential backoff
//!
//! Used identically by the ingest and install stages. Retries are
//! sequential: the delay doubles after each failed attempt and nothing is
//! slept after the final one.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempts and initial delay for a retried stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// A zero attempt count is treated as one
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Single attempt, no sleeping
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept after failed attempt `n` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1 << exponent)
    }

    /// Every delay slept between attempts
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|n| self.delay_after(n)).collect()
    }
}

/// Last value observed by [`retry_until`]
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
    pub succeeded: bool,
}

/// Run `op` until `accept` approves its value or attempts run out
///
/// `op` receives the 1-based attempt number.
pub async fn retry_until<T, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    accept: P,
) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 1;
    loop {
        let value = op(attempt).await;

        if accept(&value) {
            return Attempted {
                value,
                attempts: attempt,
                succeeded: true,
            };
        }

        if attempt >= policy.max_attempts {
            return Attempted {
                value,
                attempts: attempt,
                succeeded: false,
            };
        }

        let delay = policy.delay_after(attempt);
        warn!(
            "{} attempt {}/{} not accepted; retrying in {:?}",
            label, attempt, policy.max_attempts, delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
