//! Day-scoped forecast cache.
//!
//! A record is reused only when it was written today (in the clock's
//! timezone), for the same coordinates and units, by a build that knows its
//! schema version. On reuse only live fields are fetched; any failure on that
//! path falls back to a full fetch. Cache problems never fail a request.

use super::merge::merge_cached;
use super::types::{CacheRecord, Forecast, LiveConditions, LocationKey, StableForecast};
use crate::cache::{CacheError, CacheStore};
use crate::clock::{LocalDay, SharedClock};
use crate::observability::{CacheMissReason, SharedObserver, TracingObserver};
use crate::retry::RetryError;
use std::future::Future;
use std::path::Path;

pub struct ForecastCache {
    store: CacheStore<CacheRecord>,
    clock: SharedClock,
    observer: SharedObserver,
}

impl ForecastCache {
    pub fn new(store: CacheStore<CacheRecord>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            observer: TracingObserver::shared(),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Stable fields cached today for `key`, or why there are none.
    pub fn lookup(&self, key: &LocationKey) -> Result<StableForecast, CacheMissReason> {
        self.lookup_on(key, &self.clock.local_day())
    }

    /// Persist `stable` as today's record for `key`.
    pub fn store(&self, key: &LocationKey, stable: &StableForecast) -> Result<(), CacheError> {
        self.store_on(key, stable, &self.clock.local_day())
    }

    fn lookup_on(
        &self,
        key: &LocationKey,
        day: &LocalDay,
    ) -> Result<StableForecast, CacheMissReason> {
        let record = self.store.read().map_err(|e| match e {
            CacheError::NotFound(_) => CacheMissReason::NotFound,
            CacheError::Corrupt(reason) => CacheMissReason::Corrupt(reason),
            CacheError::UnsupportedSchema { found, .. } => {
                CacheMissReason::UnsupportedSchema(found)
            }
            other => CacheMissReason::Io(other.to_string()),
        })?;

        if record.created_on_date != day.date {
            return Err(CacheMissReason::StaleDate);
        }
        if !record.location_key().matches(key) {
            return Err(CacheMissReason::LocationChanged);
        }
        Ok(record.forecast)
    }

    fn store_on(
        &self,
        key: &LocationKey,
        stable: &StableForecast,
        day: &LocalDay,
    ) -> Result<(), CacheError> {
        let record = CacheRecord::new(key, stable.clone(), day.date, self.clock.now());
        self.store.write(&record)
    }

    /// Operator-invoked removal of the cached record.
    pub fn purge(&self) -> Result<bool, CacheError> {
        self.store.purge()
    }

    /// Resolve today's forecast for `key`.
    ///
    /// With a valid cache `reduced_fetch` supplies live fields which are
    /// merged with the cached stable ones. Without one, or when the reduced
    /// fetch fails for any reason other than a terminal one (auth, invalid
    /// request, cancellation), `full_fetch` runs for the day the record will
    /// be keyed on and its stable fields are written back.
    pub async fn fetch<Full, FullFut, Reduced, ReducedFut>(
        &self,
        key: &LocationKey,
        full_fetch: Full,
        reduced_fetch: Reduced,
    ) -> Result<Forecast, RetryError>
    where
        Full: FnOnce(LocalDay) -> FullFut,
        FullFut: Future<Output = Result<Forecast, RetryError>>,
        Reduced: FnOnce() -> ReducedFut,
        ReducedFut: Future<Output = Result<LiveConditions, RetryError>>,
    {
        let day = self.clock.local_day();
        match self.lookup_on(key, &day) {
            Ok(stable) => {
                self.observer.cache_hit(&key.location);
                match reduced_fetch().await {
                    Ok(live) => return Ok(merge_cached(&stable, live)),
                    Err(err) if err.is_terminal() => return Err(err),
                    Err(err) => {
                        self.observer
                            .reduced_fetch_fell_back(&key.location, &err.last_error());
                    }
                }
            }
            Err(reason) => self.observer.cache_miss(&key.location, &reason),
        }

        let forecast = full_fetch(day).await?;
        if let Err(e) = self.store_on(key, &forecast.stable, &day) {
            self.observer.cache_write_failed(&key.location, &e.to_string());
        }
        Ok(forecast)
    }
}
