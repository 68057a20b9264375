use super::cache::ForecastCache;
use super::merge::{from_full_fetch, live_from_current};
use super::types::*;
use crate::clock::LocalDay;
use crate::config::Config;
use crate::error::UpstreamError;
use crate::observability::{SharedObserver, TracingObserver};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryError, RetryExecutor};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum OpenWeatherError {
    #[error("Invalid coordinates: lat {lat}, lon {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Upstream(#[from] RetryError),
}

/// OpenWeather client. Every request goes through one shared limiter and
/// retry policy.
pub struct OpenWeatherClient {
    client: Client,
    config: Config,
    executor: RetryExecutor,
}

impl OpenWeatherClient {
    pub fn new(config: Config) -> Result<Self, OpenWeatherError> {
        let client = Client::builder()
            .user_agent(concat!("upstream-resilience/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        let executor = executor_for(&config, TracingObserver::shared());
        Ok(Self {
            client,
            config,
            executor,
        })
    }

    /// Route limiter and retry events to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.executor = executor_for(&self.config, observer);
        self
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Today's forecast, reusing cached stable fields when they are valid.
    pub async fn get_forecast(
        &self,
        cache: &ForecastCache,
        key: &LocationKey,
        cancel: &CancellationToken,
    ) -> Result<Forecast, OpenWeatherError> {
        validate_coordinates(key.latitude, key.longitude)?;

        let forecast = cache
            .fetch(
                key,
                |day| self.fetch_full(key, day, cancel),
                || self.fetch_live(key, cancel),
            )
            .await?;
        Ok(forecast)
    }

    /// Forecast and current conditions for `day`: every field fresh.
    pub async fn fetch_full(
        &self,
        key: &LocationKey,
        day: LocalDay,
        cancel: &CancellationToken,
    ) -> Result<Forecast, RetryError> {
        let forecast = self.get_forecast3h(key, cancel).await?;
        let current = self.get_current(key, cancel).await?;
        Ok(from_full_fetch(&forecast, &current, &day))
    }

    /// Current conditions only.
    pub async fn fetch_live(
        &self,
        key: &LocationKey,
        cancel: &CancellationToken,
    ) -> Result<LiveConditions, RetryError> {
        let current = self.get_current(key, cancel).await?;
        Ok(live_from_current(&current))
    }

    pub async fn get_forecast3h(
        &self,
        key: &LocationKey,
        cancel: &CancellationToken,
    ) -> Result<Forecast3hResponse, RetryError> {
        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_forecast_path
        );
        self.get_json(&url, key, cancel, |forecast: &Forecast3hResponse| {
            if forecast.list.is_empty() {
                return Err(UpstreamError::MalformedResponse(
                    "forecast list is empty".to_string(),
                ));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_current(
        &self,
        key: &LocationKey,
        cancel: &CancellationToken,
    ) -> Result<CurrentWeatherResponse, RetryError> {
        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_current_path
        );
        self.get_json(&url, key, cancel, |_| Ok(())).await
    }

    /// One GET, retried as a whole. `check` rejects payloads that parse but
    /// cannot be used; such a rejection is an attempt failure.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        key: &LocationKey,
        cancel: &CancellationToken,
        check: fn(&T) -> Result<(), UpstreamError>,
    ) -> Result<T, RetryError> {
        let params = [
            ("lat", key.latitude.to_string()),
            ("lon", key.longitude.to_string()),
            ("units", key.units.as_str().to_string()),
            ("appid", self.config.openweather_api_key.clone()),
        ];

        self.executor
            .run(
                |attempt| {
                    tracing::debug!(url, attempt, "Requesting OpenWeather");
                    let request = self.client.get(url).query(&params);
                    async move {
                        let response = request.send().await?;
                        let status = response.status();
                        let body = response.text().await?;
                        if !status.is_success() {
                            return Err(UpstreamError::status(status.as_u16(), body));
                        }
                        let payload = serde_json::from_str::<T>(&body)?;
                        check(&payload)?;
                        Ok(payload)
                    }
                },
                cancel,
            )
            .await
    }
}

fn executor_for(config: &Config, observer: SharedObserver) -> RetryExecutor {
    let limiter = RateLimiter::new(config.openweather_max_requests, config.openweather_window)
        .with_name("openweather")
        .with_observer(observer.clone());
    RetryExecutor::new(config.retry_policy.clone(), Arc::new(limiter))
        .with_attempt_timeout(config.request_timeout)
        .with_observer(observer)
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), OpenWeatherError> {
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(OpenWeatherError::InvalidCoordinates { lat, lon })
    }
}
