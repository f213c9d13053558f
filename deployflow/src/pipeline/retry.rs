//! Per-node retry policy.
//!
//! Retries re-invoke the node's own provider call and never re-run upstream
//! producers.

use crate::errors::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// How the delay grows between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * 2^retry`
    #[default]
    Exponential,
    /// `base * (retry + 1)`
    Linear,
    /// `base`
    Constant,
}

/// Randomization applied to a computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// The delay as computed.
    None,
    /// Uniform in `0..=delay`.
    #[default]
    Full,
    /// `delay / 2` plus uniform in `0..=delay / 2`.
    Equal,
}

/// Retry policy of one action or resource.
///
/// Deserializes from a partial map; missing keys take their defaults, so
/// `retry: { max_retries: 2 }` in a document is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth of the delay.
    pub backoff_strategy: BackoffStrategy,
    /// Randomization of the delay.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 200,
            max_delay_ms: 30_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// The default policy: a single attempt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Caps every delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Total attempts allowed, the first one included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failure on attempt `attempt` (1-based) is tried again.
    #[must_use]
    pub fn permits_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        error.is_retryable() && attempt < self.max_attempts()
    }

    /// Delay before retry number `retry`, counted from 0.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let grown = match self.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Constant => base,
        };
        let capped = grown.min(self.max_delay_ms);

        let millis = match self.jitter_strategy {
            JitterStrategy::None => capped,
            JitterStrategy::Full if capped > 0 => rand::thread_rng().gen_range(0..=capped),
            JitterStrategy::Equal if capped / 2 > 0 => {
                capped / 2 + rand::thread_rng().gen_range(0..=capped / 2)
            }
            JitterStrategy::Full | JitterStrategy::Equal => capped,
        };
        Duration::from_millis(millis)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of
/// attempts.
///
/// `operation` receives the 1-based attempt number. `on_retry` sees the failed
/// attempt, the delay about to be slept and the error. Returns the final
/// result with the number of attempts made.
pub async fn with_retry<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    mut on_retry: R,
) -> (Result<T, ProviderError>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    R: FnMut(u32, Duration, &ProviderError),
{
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(error) => error,
        };
        if !config.permits_retry(attempt, &error) {
            return (Err(error), attempt);
        }

        let delay = config.delay_for(attempt - 1);
        tracing::debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying provider call"
        );
        on_retry(attempt, delay, &error);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
