// crates/core/src/retry.rs

//! Bounded retry with exponential backoff and jitter for trial calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::TrialError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay_ms, config.max_delay_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound of the backoff before retry number `retry` (1-based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }

    /// Jittered delay in `[ceiling / 2, ceiling]`.
    ///
    /// Uses the thread RNG so retries never shift the search's random stream.
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(ceiling / 2..=ceiling))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or attempts run out. Returns the last result and the attempts used.
    ///
    /// `on_retry` sees (next attempt number, delay, error) before each sleep.
    pub async fn execute<F, Fut, T, L>(&self, mut operation: F, mut on_retry: L) -> (Result<T, TrialError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TrialError>>,
        L: FnMut(u32, Duration, &TrialError),
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    on_retry(attempt + 1, delay, &err);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}
