use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetrySettings;
use crate::errors::StoreError;
use crate::metrics;

/// Exponential backoff for single CQL statements.
///
/// Only transient errors (see [`StoreError::is_transient`]) are retried.
/// The n-th wait is `min_delay * base^(n-1)` shifted by up to half of
/// `min_delay` of jitter in either direction, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    min_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Minimum `delay / 2`, maximum `delay`, at most `retry` retries.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        let defaults = Self::default();
        let delay = settings.delay();
        let (min_delay, max_delay) = if delay.is_zero() {
            (defaults.min_delay, defaults.max_delay)
        } else {
            (delay / 2, delay)
        };

        Self {
            max_retries: u32::from(settings.retry),
            min_delay,
            max_delay,
            ..defaults
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Wait before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let mut nap = min * self.exponential_base.powi(exponent);
        if min > 0.0 {
            nap += rand::thread_rng().gen_range(-min / 2.0..min / 2.0);
        }
        let nap = Duration::from_secs_f64(nap.max(0.0));
        std::cmp::min(self.max_delay, nap)
    }

    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        mut operation: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                result = operation() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_retries => {
                    if attempt > 0 {
                        warn!(
                            "Statement '{}' failed after {} attempts: {}",
                            statement,
                            attempt + 1,
                            err
                        );
                    }
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "Statement '{}' failed (attempt {}): {}, retrying in {:?}",
                        statement, attempt, err, delay
                    );
                    metrics::record_retry(statement);

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }
}
