//! Retry mechanism with exponential backoff
//!
//! Every attempt goes through the upstream's [`RateLimiter`] first, runs
//! under an optional per-attempt deadline, and is classified on failure.
//! Retryable failures back off `min(base * 2^n, max)` with jitter.

use crate::error::{classify, ClassifiedError, ErrorKind, UpstreamError};
use crate::observability::{SharedObserver, TracingObserver};
use crate::rate_limit::{cancellable_sleep, RateLimiter};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("base_delay must be greater than zero")]
    ZeroBaseDelay,
    #[error("max_delay ({max:?}) must not be below base_delay ({base:?})")]
    MaxBelowBase { base: Duration, max: Duration },
    #[error("jitter_fraction must be within 0..=1, got {0}")]
    JitterOutOfRange(f64),
}

/// Immutable backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_fraction: f64,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::NoAttempts);
        }
        if base_delay.is_zero() {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if max_delay < base_delay {
            return Err(PolicyError::MaxBelowBase {
                base: base_delay,
                max: max_delay,
            });
        }
        if !(0.0..=1.0).contains(&jitter_fraction) {
            return Err(PolicyError::JitterOutOfRange(jitter_fraction));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_fraction,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// Un-jittered delay after the 0-indexed `attempt`: `min(base * 2^attempt, max)`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Jittered delay after `attempt`, drawing from the thread RNG.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::thread_rng().gen();
        self.jittered(self.base_delay_for(attempt), sample)
    }

    /// `delay * (1 + jitter * (2 * sample - 1))`, clamped to be non-negative.
    /// `sample` is expected in `[0, 1)`.
    pub fn jittered(&self, delay: Duration, sample: f64) -> Duration {
        let spread = self.jitter_fraction * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        let secs = delay.as_secs_f64() * (1.0 + spread);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.25,
        }
    }
}

/// Terminal outcome of [`RetryExecutor::run`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError {
    /// Every attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { last: ClassifiedError, attempts: u32 },
    /// The request itself is wrong, or the upstream refused it.
    #[error("non-retryable failure after {attempts} attempt(s): {last}")]
    NonRetryable { last: ClassifiedError, attempts: u32 },
    /// The caller's cancellation fired.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl RetryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::NonRetryable { last, .. } => last.kind,
            RetryError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::NonRetryable { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn last_error(&self) -> ClassifiedError {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::NonRetryable { last, .. } => {
                last.clone()
            }
            RetryError::Cancelled { .. } => ClassifiedError::cancelled(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Errors that are the request's own fault: no fallback can help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AuthError | ErrorKind::InvalidRequest | ErrorKind::Cancelled
        )
    }
}

/// Drives attempts of one upstream call, bound to that upstream's limiter.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    attempt_timeout: Option<Duration>,
    observer: SharedObserver,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, limiter: Arc<RateLimiter>) -> Self {
        Self {
            policy,
            limiter,
            attempt_timeout: None,
            observer: TracingObserver::shared(),
        }
    }

    /// Deadline applied to each individual attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run `operation` until it succeeds, fails terminally, runs out of
    /// attempts, or `cancel` fires. The closure receives the 0-indexed
    /// attempt number and must be safe to call more than once.
    pub async fn run<F, Fut, T>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let upstream = self.limiter.name();
        let max_attempts = self.policy.max_attempts;

        for attempt in 0..max_attempts {
            if self.limiter.admit(cancel).await.is_err() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
                result = self.attempt(operation(attempt)) => result,
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        self.observer.recovered(upstream, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(err) => classify(&err),
            };

            let attempts = attempt + 1;
            if error.kind == ErrorKind::Cancelled {
                return Err(RetryError::Cancelled { attempts });
            }
            if !error.retryable {
                self.observer.gave_up(upstream, attempts, &error);
                return Err(RetryError::NonRetryable {
                    last: error,
                    attempts,
                });
            }
            if attempts == max_attempts {
                self.observer.gave_up(upstream, attempts, &error);
                return Err(RetryError::Exhausted {
                    last: error,
                    attempts,
                });
            }

            let delay = self.policy.delay_for(attempt);
            self.observer.retry_scheduled(upstream, attempt, &error, delay);
            if !cancellable_sleep(delay, cancel).await {
                return Err(RetryError::Cancelled { attempts });
            }
        }

        // max_attempts >= 1 is enforced by RetryPolicy, so the loop always returns.
        Err(RetryError::Cancelled { attempts: max_attempts })
    }

    async fn attempt<T, Fut>(&self, fut: Fut) -> Result<T, UpstreamError>
    where
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or(Err(UpstreamError::Timeout(limit))),
            None => fut.await,
        }
    }
}
