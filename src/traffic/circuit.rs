//! Circuit breaker for one named operation class.
//!
//! After `failure_threshold` consecutive transient failures the circuit opens
//! and calls fail fast with [`HuginnError::CircuitOpen`] until `reset_timeout`
//! has passed since the last failure. Then a single trial call is let through:
//! success closes the circuit, failure re-opens it for another cooldown.
//!
//! Only failures the retry policy would retry (rate limiting, 5xx, network,
//! timeout) count. Any other response proves the server is answering and
//! resets the count like a success.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::telemetry;
use crate::{HuginnError, Result};

/// Snapshot of a breaker's state.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    pub failure_count: u32,
    pub last_failure_at: Option<Instant>,
    pub is_open: bool,
    /// When the current half-open trial was let through, if one is running.
    pub trial_started_at: Option<Instant>,
}

pub struct CircuitBreaker {
    label: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(label: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            label: label.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(CircuitState::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run `op` unless the circuit is open.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire()?;
        let result = op().await;
        match &result {
            Err(e) if e.is_retryable() => self.record_failure(e),
            _ => self.record_success(),
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        self.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        *self.lock() = CircuitState::default();
    }

    fn acquire(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.is_open {
            return Ok(());
        }

        let now = Instant::now();
        let cooling_down = state
            .last_failure_at
            .is_some_and(|at| now.saturating_duration_since(at) <= self.reset_timeout);
        // A trial that never reported back (caller dropped) expires after one cooldown.
        let trial_running = state
            .trial_started_at
            .is_some_and(|at| now.saturating_duration_since(at) <= self.reset_timeout);

        if cooling_down || trial_running {
            metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL, "operation" => self.label.clone())
                .increment(1);
            return Err(HuginnError::CircuitOpen {
                label: self.label.clone(),
            });
        }

        info!(label = %self.label, "circuit half-open, allowing trial request");
        state.trial_started_at = Some(now);
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.lock();
        if state.is_open {
            info!(label = %self.label, "circuit closed after successful trial");
        }
        *state = CircuitState::default();
    }

    fn record_failure(&self, err: &HuginnError) {
        let mut state = self.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(Instant::now());
        state.trial_started_at = None;
        if state.failure_count >= self.failure_threshold && !state.is_open {
            state.is_open = true;
            warn!(
                label = %self.label,
                failures = state.failure_count,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                error = %err,
                "circuit opened"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
