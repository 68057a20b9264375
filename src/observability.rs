//! Observer hooks handed to each component at construction.
//!
//! Components report domain events through an [`Observer`] instead of a
//! process-wide logger. [`TracingObserver`] forwards them to `tracing`.

use crate::error::ClassifiedError;
use std::sync::Arc;
use std::time::Duration;

/// Why a cached forecast was not reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMissReason {
    NotFound,
    Corrupt(String),
    UnsupportedSchema(u32),
    StaleDate,
    LocationChanged,
    Io(String),
}

pub trait Observer: Send + Sync {
    fn admission_delayed(&self, _upstream: &str, _wait: Duration) {}
    fn admission_cancelled(&self, _upstream: &str) {}
    fn retry_scheduled(
        &self,
        _upstream: &str,
        _attempt: u32,
        _error: &ClassifiedError,
        _delay: Duration,
    ) {
    }
    fn recovered(&self, _upstream: &str, _attempts: u32) {}
    fn gave_up(&self, _upstream: &str, _attempts: u32, _error: &ClassifiedError) {}
    fn cache_hit(&self, _location: &str) {}
    fn cache_miss(&self, _location: &str, _reason: &CacheMissReason) {}
    fn cache_write_failed(&self, _location: &str, _error: &str) {}
    fn reduced_fetch_fell_back(&self, _location: &str, _error: &ClassifiedError) {}
}

pub type SharedObserver = Arc<dyn Observer>;

/// Default observer: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn shared() -> SharedObserver {
        Arc::new(TracingObserver)
    }
}

impl Observer for TracingObserver {
    fn admission_delayed(&self, upstream: &str, wait: Duration) {
        tracing::debug!(
            upstream,
            wait_ms = wait.as_millis() as u64,
            "Rate limit reached, waiting for a slot"
        );
    }

    fn admission_cancelled(&self, upstream: &str) {
        tracing::debug!(upstream, "Admission cancelled while waiting");
    }

    fn retry_scheduled(
        &self,
        upstream: &str,
        attempt: u32,
        error: &ClassifiedError,
        delay: Duration,
    ) {
        tracing::warn!(
            upstream,
            attempt = attempt + 1,
            kind = %error.kind,
            status = ?error.status_code,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed: {}. Retrying",
            error.message
        );
    }

    fn recovered(&self, upstream: &str, attempts: u32) {
        tracing::info!(upstream, attempts, "Request recovered after retries");
    }

    fn gave_up(&self, upstream: &str, attempts: u32, error: &ClassifiedError) {
        tracing::warn!(
            upstream,
            attempts,
            kind = %error.kind,
            retryable = error.retryable,
            "Giving up: {}",
            error.message
        );
    }

    fn cache_hit(&self, location: &str) {
        tracing::debug!(location, "Using cached daily forecast");
    }

    fn cache_miss(&self, location: &str, reason: &CacheMissReason) {
        match reason {
            CacheMissReason::Corrupt(_) | CacheMissReason::Io(_) => {
                tracing::warn!(location, ?reason, "Forecast cache unusable, doing a full fetch")
            }
            _ => tracing::debug!(location, ?reason, "No valid forecast cache"),
        }
    }

    fn cache_write_failed(&self, location: &str, error: &str) {
        tracing::warn!(location, error, "Failed to write forecast cache");
    }

    fn reduced_fetch_fell_back(&self, location: &str, error: &ClassifiedError) {
        tracing::warn!(
            location,
            kind = %error.kind,
            "Live refresh failed ({}), falling back to a full fetch",
            error.message
        );
    }
}
