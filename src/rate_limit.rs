//! Sliding-window rate limiting
//!
//! Counts admissions within the trailing `window` and suspends the caller
//! when the quota is used up.

use crate::observability::{SharedObserver, TracingObserver};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    #[error("admission cancelled while waiting for a rate limit slot")]
    Cancelled,
}

/// Process-local sliding-window limiter, one per upstream client.
pub struct RateLimiter {
    name: String,
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    observer: SharedObserver,
}

impl RateLimiter {
    /// # Arguments
    /// * `max_requests` - Requests allowed per window (at least 1)
    /// * `window` - Length of the trailing window
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            name: "upstream".to_string(),
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
            observer: TracingObserver::shared(),
        }
    }

    /// Label used in emitted events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a slot, or until `cancel` fires.
    ///
    /// A cancelled call is never recorded as a request. After each wake the
    /// window is re-checked, since another waiter may have taken the slot.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<(), AdmitError> {
        let mut delayed = false;
        loop {
            if cancel.is_cancelled() {
                self.observer.admission_cancelled(&self.name);
                return Err(AdmitError::Cancelled);
            }

            let deadline = {
                let mut timestamps = self.lock();
                let now = Instant::now();
                self.prune(&mut timestamps, now);

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return Ok(());
                }
                // Non-empty here: max_requests >= 1.
                timestamps[0] + self.window
            };

            if !delayed {
                delayed = true;
                let wait = deadline.saturating_duration_since(Instant::now());
                self.observer.admission_delayed(&self.name, wait);
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    /// Record a request if a slot is free right now, without waiting.
    pub fn try_admit(&self) -> bool {
        let mut timestamps = self.lock();
        let now = Instant::now();
        self.prune(&mut timestamps, now);
        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Requests recorded within the current window.
    pub fn in_flight(&self) -> usize {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, Instant::now());
        timestamps.len()
    }

    /// How long the next `admit` would wait. Zero if a slot is free.
    pub fn time_until_available(&self) -> Duration {
        let mut timestamps = self.lock();
        let now = Instant::now();
        self.prune(&mut timestamps, now);
        if timestamps.len() < self.max_requests {
            return Duration::ZERO;
        }
        timestamps
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while timestamps.front().is_some_and(|t| *t <= cutoff) {
            timestamps.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // The deque stays consistent even if a holder panicked.
        self.timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn recorded(&self) -> Vec<Instant> {
        self.lock().iter().copied().collect()
    }
}

/// Sleep for `duration`, returning early with `false` if `cancel` fires.
pub(crate) async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
