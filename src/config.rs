use crate::forecast::types::{LocationKey, Units};
use crate::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub openweather_api_key: String,
    pub openweather_base_url: String,
    pub openweather_forecast_path: String,
    pub openweather_current_path: String,
    pub openweather_max_requests: usize,
    pub openweather_window: Duration,
    pub retry_policy: RetryPolicy,
    pub request_timeout: Duration,
    pub app_timezone: chrono_tz::Tz,
    pub cache_path: PathBuf,
    pub location: LocationKey,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Unset variables
    /// fall back to defaults; set but malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let retry_policy = RetryPolicy::new(
            parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 3u32)?,
            Duration::from_millis(parse_or(&lookup, "RETRY_BASE_DELAY_MS", 1000u64)?),
            Duration::from_millis(parse_or(&lookup, "RETRY_MAX_DELAY_MS", 30_000u64)?),
            parse_or(&lookup, "RETRY_JITTER", 0.25f64)?,
        )?;

        // Without APP_TIMEZONE, a zone name in TZ is the host's local day.
        let app_timezone = match lookup("APP_TIMEZONE") {
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map_err(|_| anyhow::anyhow!("Invalid timezone in APP_TIMEZONE"))?,
            None => lookup("TZ")
                .and_then(|name| name.parse::<chrono_tz::Tz>().ok())
                .unwrap_or(chrono_tz::Tz::UTC),
        };

        let latitude: f64 = parse_or(&lookup, "WEATHER_LAT", 0.0)?;
        let longitude: f64 = parse_or(&lookup, "WEATHER_LON", 0.0)?;
        crate::forecast::openweather::validate_coordinates(latitude, longitude)?;
        let units =
            Units::from_str(&var_or("WEATHER_UNITS", "metric")).map_err(anyhow::Error::msg)?;

        let max_requests: usize = parse_or(&lookup, "OPENWEATHER_MAX_REQUESTS", 60)?;
        if max_requests == 0 {
            anyhow::bail!("OPENWEATHER_MAX_REQUESTS must be at least 1");
        }

        Ok(Config {
            openweather_api_key: lookup("OPENWEATHER_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("OPENWEATHER_API_KEY not set"))?,
            openweather_base_url: var_or("OPENWEATHER_BASE_URL", "https://api.openweathermap.org"),
            openweather_forecast_path: var_or("OPENWEATHER_FORECAST_PATH", "/data/2.5/forecast"),
            openweather_current_path: var_or("OPENWEATHER_CURRENT_PATH", "/data/2.5/weather"),
            openweather_max_requests: max_requests,
            openweather_window: Duration::from_secs(parse_or(
                &lookup,
                "OPENWEATHER_WINDOW_SECS",
                60u64,
            )?),
            retry_policy,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?),
            app_timezone,
            cache_path: PathBuf::from(var_or(
                "FORECAST_CACHE_PATH",
                "./cache/forecast_cache.json",
            )),
            location: LocationKey::new(
                var_or("WEATHER_LOCATION", "default"),
                latitude,
                longitude,
                units,
            ),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("OPENWEATHER_API_KEY", "secret")])).unwrap();
        assert_eq!(config.openweather_base_url, "https://api.openweathermap.org");
        assert_eq!(config.openweather_max_requests, 60);
        assert_eq!(config.openweather_window, Duration::from_secs(60));
        assert_eq!(config.retry_policy.max_attempts(), 3);
        assert_eq!(config.app_timezone, chrono_tz::Tz::UTC);
        assert_eq!(config.location.units, Units::Metric);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("OPENWEATHER_API_KEY", "secret"),
            ("APP_TIMEZONE", "Asia/Jakarta"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_BASE_DELAY_MS", "200"),
            ("RETRY_MAX_DELAY_MS", "5000"),
            ("RETRY_JITTER", "0.1"),
            ("WEATHER_LAT", "-6.2"),
            ("WEATHER_LON", "106.8"),
            ("WEATHER_UNITS", "imperial"),
            ("FORECAST_CACHE_PATH", "/tmp/fc.json"),
        ]))
        .unwrap();
        assert_eq!(config.app_timezone, chrono_tz::Asia::Jakarta);
        assert_eq!(config.retry_policy.max_attempts(), 5);
        assert_eq!(config.retry_policy.base_delay(), Duration::from_millis(200));
        assert_eq!(config.retry_policy.max_delay(), Duration::from_secs(5));
        assert_eq!(config.retry_policy.jitter_fraction(), 0.1);
        assert_eq!(config.location.latitude, -6.2);
        assert_eq!(config.location.units, Units::Imperial);
        assert_eq!(config.cache_path, PathBuf::from("/tmp/fc.json"));
    }

    #[test]
    fn test_timezone_falls_back_to_tz() {
        let key = ("OPENWEATHER_API_KEY", "secret");
        let config = Config::from_lookup(lookup(&[key, ("TZ", "America/Chicago")])).unwrap();
        assert_eq!(config.app_timezone, chrono_tz::America::Chicago);

        let config = Config::from_lookup(lookup(&[
            key,
            ("TZ", "America/Chicago"),
            ("APP_TIMEZONE", "Asia/Jakarta"),
        ]))
        .unwrap();
        assert_eq!(config.app_timezone, chrono_tz::Asia::Jakarta);

        // POSIX-style TZ values are not zone names.
        let config = Config::from_lookup(lookup(&[key, ("TZ", ":/etc/localtime")])).unwrap();
        assert_eq!(config.app_timezone, chrono_tz::Tz::UTC);
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENWEATHER_API_KEY"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let key = ("OPENWEATHER_API_KEY", "secret");
        assert!(Config::from_lookup(lookup(&[key, ("APP_TIMEZONE", "Mars/Base")])).is_err());
        assert!(Config::from_lookup(lookup(&[key, ("RETRY_MAX_ATTEMPTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[key, ("RETRY_JITTER", "2")])).is_err());
        assert!(Config::from_lookup(lookup(&[key, ("WEATHER_LAT", "95")])).is_err());
        assert!(Config::from_lookup(lookup(&[key, ("WEATHER_UNITS", "kelvin")])).is_err());
        assert!(Config::from_lookup(lookup(&[key, ("OPENWEATHER_MAX_REQUESTS", "0")])).is_err());
    }
}
