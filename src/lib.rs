//! Client-side resilience for rate-limited upstream HTTP services.
//!
//! - [`rate_limit::RateLimiter`]: sliding-window admission with cancellable waits.
//! - [`retry::RetryExecutor`]: attempts with exponential backoff and jitter,
//!   driven by [`error::classify`].
//! - [`cache::CacheStore`]: one record per file, replaced atomically.
//! - [`forecast::ForecastCache`]: day-scoped reuse of stable forecast fields,
//!   refreshing only live fields on a cache hit.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod forecast;
pub mod observability;
pub mod rate_limit;
pub mod retry;

pub use cache::{CacheError, CacheStore, Versioned};
pub use clock::{Clock, FixedClock, LocalDay, SystemClock};
pub use config::Config;
pub use error::{classify, ClassifiedError, ErrorKind, UpstreamError};
pub use observability::{Observer, TracingObserver};
pub use rate_limit::{AdmitError, RateLimiter};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
