//! Retry configuration, delay calculation, and the retry executor.
//!
//! [`RetryExecutor::execute`] wraps a single asynchronous operation with
//! exponential backoff, jitter, server `Retry-After` hints, and an offline
//! short-circuit. It answers "should this one call be tried again"; the
//! [`CircuitBreaker`](super::CircuitBreaker) answers "should we stop calling
//! this dependency at all".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::probe::{AlwaysOnline, ConnectivityProbe};
use crate::telemetry;
use crate::{HuginnError, Result};

/// Upper bound of the random jitter, as a fraction of the computed delay.
const MAX_JITTER: f64 = 0.1;

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(200))
///     .backoff_multiplier(1.5);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt. 0 = single attempt. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Cap on any single delay, including server hints. Default: 30s.
    pub max_delay: Duration,
    /// Growth factor per attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Whether to add up to 10% random jitter. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the initial attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the exponential growth factor.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff for a given attempt number (0-indexed), without jitter.
    ///
    /// `base_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Full delay before retrying after `attempt` failed.
    ///
    /// A server `retry_after` hint replaces the computed backoff; either way
    /// the result never exceeds `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(hint) => hint,
            None if self.jitter => {
                let jitter = fastrand::f64() * MAX_JITTER;
                self.delay_for_attempt(attempt).mul_f64(1.0 + jitter)
            }
            None => self.delay_for_attempt(attempt),
        };
        delay.min(self.max_delay)
    }
}

/// Runs operations under a [`RetryConfig`], consulting a [`ConnectivityProbe`]
/// before each attempt.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    probe: Arc<dyn ConnectivityProbe>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self { config, probe }
    }

    /// Executor with the given config and an always-online probe.
    pub fn with_config(config: RetryConfig) -> Self {
        Self::new(config, Arc::new(AlwaysOnline))
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `op` with retry logic.
    ///
    /// Retries errors classified by [`HuginnError::is_retryable()`] up to
    /// `max_retries` times. Permanent errors and the last failure are returned
    /// unchanged.
    pub async fn execute<F, Fut, T>(&self, label: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;
        loop {
            if !self.probe.is_online() {
                debug!(label, attempt, "offline, not attempting request");
                return Err(HuginnError::Offline);
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err); // permanent error, no retry
            }
            if attempt + 1 >= max_attempts {
                warn!(
                    label,
                    attempts = attempt + 1,
                    error = %err,
                    "giving up after exhausting retries"
                );
                return Err(err);
            }

            let delay = self.config.effective_delay(attempt, err.retry_after());
            metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => label.to_owned())
                .increment(1);
            warn!(
                label,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
