//! Admission control for outbound requests.
//!
//! [`RequestGateway`] sits in front of every call to the note server and
//! enforces two hard caps:
//!
//! - at most `max_concurrent` operations executing at once;
//! - at most `max_per_minute` admissions in any trailing window (60s).
//!
//! Calls that cannot be admitted immediately wait in a FIFO queue. A queued
//! caller owns its operation; the queue only holds its admission ticket
//! (a oneshot sender). Whenever a slot frees up, or the oldest admission
//! leaves the rate window, tickets are granted from the head of the queue.
//!
//! A granted ticket carries a [`SlotGuard`]; dropping it (operation finished,
//! or caller went away) releases the slot. The gateway's lock is never held
//! across an await.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::telemetry;
use crate::{HuginnError, Result};

/// Configuration for [`RequestGateway`].
///
/// ```rust
/// # use huginn::GatewayConfig;
/// let config = GatewayConfig::new().max_concurrent(2).max_per_minute(30);
/// assert_eq!(config.max_concurrent, 2);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum operations executing at once. Default: 5.
    pub max_concurrent: usize,
    /// Maximum admissions per rate window. Default: 60.
    pub max_per_minute: usize,
    /// Length of the rolling rate window. Default: 60s.
    pub window: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_per_minute: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn max_per_minute(mut self, n: usize) -> Self {
        self.max_per_minute = n;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Point-in-time view of the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub queue_length: usize,
    pub active_requests: usize,
    pub requests_in_last_minute: usize,
}

struct QueueItem {
    id: u64,
    enqueued_at: Instant,
    ticket: oneshot::Sender<Result<SlotGuard>>,
}

struct State {
    active: usize,
    /// Admission instants inside the rate window, oldest first.
    admissions: VecDeque<Instant>,
    queue: VecDeque<QueueItem>,
    next_id: u64,
    timer_armed: bool,
}

struct Shared {
    config: GatewayConfig,
    state: Mutex<State>,
}

/// Holds one concurrency slot; releases it on drop.
pub(crate) struct SlotGuard {
    shared: Option<Arc<Shared>>,
}

impl SlotGuard {
    /// Detach without releasing (the caller undoes the admission itself).
    fn disarm(&mut self) {
        self.shared = None;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let mut state = shared.lock();
            state.active = state.active.saturating_sub(1);
            Shared::dispatch(&shared, &mut state);
        }
    }
}

/// FIFO admission controller with concurrency and rate caps.
///
/// Cheap to clone; clones share the same queue and counters.
#[derive(Clone)]
pub struct RequestGateway {
    shared: Arc<Shared>,
}

impl RequestGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let config = GatewayConfig {
            max_concurrent: config.max_concurrent.max(1),
            max_per_minute: config.max_per_minute.max(1),
            window: config.window,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    active: 0,
                    admissions: VecDeque::new(),
                    queue: VecDeque::new(),
                    next_id: 0,
                    timer_armed: false,
                }),
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    /// Run `op` once admitted.
    ///
    /// Fails with [`HuginnError::Cancelled`] if the request was still queued
    /// when [`clear_queue`](Self::clear_queue) ran.
    pub async fn submit<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _slot = self.admit().await?;
        op().await
    }

    /// Current queue length, active count and rate-window usage.
    pub fn status(&self) -> GatewayStatus {
        let mut state = self.shared.lock();
        let now = Instant::now();
        self.shared.prune(&mut state, now);
        GatewayStatus {
            queue_length: state.queue.len(),
            active_requests: state.active,
            requests_in_last_minute: state.admissions.len(),
        }
    }

    /// Reject every queued request with [`HuginnError::Cancelled`].
    ///
    /// Active requests are untouched. Returns how many were rejected.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.shared.lock();
        let cancelled = state.queue.len();
        for item in state.queue.drain(..) {
            let _ = item.ticket.send(Err(HuginnError::Cancelled));
        }
        metrics::gauge!(telemetry::GATEWAY_QUEUE_DEPTH).set(0.0);
        if cancelled > 0 {
            metrics::counter!(telemetry::GATEWAY_CANCELLED_TOTAL).increment(cancelled as u64);
            info!(cancelled, "cleared request queue");
        }
        cancelled
    }

    async fn admit(&self) -> Result<SlotGuard> {
        let ticket = {
            let mut state = self.shared.lock();
            let now = Instant::now();
            self.shared.prune(&mut state, now);

            if state.queue.is_empty() && self.shared.has_capacity(&state) {
                return Ok(Shared::grant(&self.shared, &mut state, now));
            }

            let (tx, rx) = oneshot::channel();
            let id = state.next_id;
            state.next_id += 1;
            state.queue.push_back(QueueItem {
                id,
                enqueued_at: now,
                ticket: tx,
            });
            debug!(
                id,
                queue_length = state.queue.len(),
                active = state.active,
                "request queued"
            );
            Shared::dispatch(&self.shared, &mut state);
            rx
        };

        match ticket.await {
            Ok(granted) => granted,
            // The sender only disappears with the gateway itself.
            Err(_) => Err(HuginnError::Cancelled),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Counters are updated atomically under the lock; a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, state: &mut State, now: Instant) {
        while let Some(&oldest) = state.admissions.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                state.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_capacity(&self, state: &State) -> bool {
        state.active < self.config.max_concurrent
            && state.admissions.len() < self.config.max_per_minute
    }

    fn grant(shared: &Arc<Shared>, state: &mut State, now: Instant) -> SlotGuard {
        state.active += 1;
        state.admissions.push_back(now);
        SlotGuard {
            shared: Some(Arc::clone(shared)),
        }
    }

    /// Admit queued requests from the head while capacity allows.
    fn dispatch(shared: &Arc<Shared>, state: &mut State) {
        let now = Instant::now();
        shared.prune(state, now);

        while !state.queue.is_empty() && shared.has_capacity(state) {
            let Some(item) = state.queue.pop_front() else {
                break;
            };
            if item.ticket.is_closed() {
                continue; // caller gave up while queued
            }
            let guard = Shared::grant(shared, state, now);
            match item.ticket.send(Ok(guard)) {
                Ok(()) => debug!(
                    id = item.id,
                    waited_ms = now.saturating_duration_since(item.enqueued_at).as_millis() as u64,
                    "queued request admitted"
                ),
                Err(rejected) => {
                    if let Ok(mut guard) = rejected {
                        guard.disarm();
                    }
                    state.active -= 1;
                    state.admissions.pop_back();
                }
            }
        }

        metrics::gauge!(telemetry::GATEWAY_QUEUE_DEPTH).set(state.queue.len() as f64);

        // Only the rate window blocks the head: wake up when its oldest admission expires.
        if !state.queue.is_empty()
            && !state.timer_armed
            && state.active < shared.config.max_concurrent
            && let Some(&oldest) = state.admissions.front()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            state.timer_armed = true;
            let wake_at = oldest + shared.config.window;
            let shared = Arc::clone(shared);
            handle.spawn(async move {
                tokio::time::sleep_until(wake_at).await;
                let mut state = shared.lock();
                state.timer_armed = false;
                Shared::dispatch(&shared, &mut state);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn immediate_admission_records_rate_usage() {
        let gateway = RequestGateway::new(GatewayConfig::default());
        let value = gateway.submit(|| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        let status = gateway.status();
        assert_eq!(status.active_requests, 0);
        assert_eq!(status.requests_in_last_minute, 1);
    }

    #[tokio::test]
    async fn zero_limits_are_clamped() {
        let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(0).max_per_minute(0));
        assert_eq!(gateway.config().max_concurrent, 1);
        assert!(gateway.submit(|| async { Ok(()) }).await.is_ok());
    }
}
