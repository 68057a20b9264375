use crate::cache::Versioned;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" => Ok(Units::Standard),
            other => Err(format!("Invalid units: {}. Must be metric, imperial or standard", other)),
        }
    }
}

/// Where and in which units a forecast was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationKey {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub units: Units,
}

impl LocationKey {
    /// Coordinates closer than this are the same place.
    const COORD_EPSILON: f64 = 1e-4;

    pub fn new(location: impl Into<String>, latitude: f64, longitude: f64, units: Units) -> Self {
        Self {
            location: location.into(),
            latitude,
            longitude,
            units,
        }
    }

    /// Equality on `(latitude, longitude, units)`. The label is informational.
    pub fn matches(&self, other: &LocationKey) -> bool {
        self.units == other.units
            && (self.latitude - other.latitude).abs() < Self::COORD_EPSILON
            && (self.longitude - other.longitude).abs() < Self::COORD_EPSILON
    }
}

/// Forecast data that does not change within a calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableForecast {
    pub temp_high: i32,
    pub temp_low: i32,
    /// Unix seconds.
    pub sunrise: i64,
    /// Unix seconds.
    pub sunset: i64,
    pub city_name: String,
    pub country: String,
    /// Seconds east of UTC.
    pub timezone_offset: i32,
}

/// Data that must be fetched fresh on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConditions {
    pub current_temp: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub conditions: String,
    /// Unix seconds of the observation.
    pub observed_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    /// Every field came from this call's full fetch.
    Full,
    /// Stable fields came from today's cache, live fields from this call.
    CachedStable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(flatten)]
    pub stable: StableForecast,
    #[serde(flatten)]
    pub live: LiveConditions,
    pub source: ForecastSource,
}

/// The persisted day-scoped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub created_on_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub units: Units,
    pub schema_version: u32,
    pub forecast: StableForecast,
}

impl CacheRecord {
    pub fn new(
        key: &LocationKey,
        forecast: StableForecast,
        created_on_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            created_on_date,
            created_at,
            location: key.location.clone(),
            latitude: key.latitude,
            longitude: key.longitude,
            units: key.units,
            schema_version: Self::SCHEMA_VERSION,
            forecast,
        }
    }

    pub fn location_key(&self) -> LocationKey {
        LocationKey::new(self.location.clone(), self.latitude, self.longitude, self.units)
    }
}

impl Versioned for CacheRecord {
    const SCHEMA_VERSION: u32 = 1;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

// OpenWeather 5-day / 3-hour forecast (`/data/2.5/forecast`).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hResponse {
    #[serde(default)]
    pub cnt: i32,
    pub list: Vec<Forecast3hItem>,
    pub city: Forecast3hCity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hItem {
    pub dt: i64,
    pub main: WeatherMain,
    #[serde(default)]
    pub weather: Vec<WeatherDescription>,
    #[serde(default)]
    pub pop: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hCity {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub coord: Coord,
    #[serde(default)]
    pub country: String,
    pub timezone: i32,
    pub sunrise: i64,
    pub sunset: i64,
}

// OpenWeather current weather (`/data/2.5/weather`).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherResponse {
    pub coord: Coord,
    #[serde(default)]
    pub weather: Vec<WeatherDescription>,
    pub main: WeatherMain,
    #[serde(default)]
    pub wind: Wind,
    pub dt: i64,
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherMain {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    #[serde(default)]
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherDescription {
    pub id: i32,
    pub main: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;

    #[test]
    fn test_location_key_matching() {
        let key = LocationKey::new("Jakarta", -6.2088, 106.8456, Units::Metric);
        assert!(key.matches(&LocationKey::new("Home", -6.20881, 106.84559, Units::Metric)));
        assert!(!key.matches(&LocationKey::new("Jakarta", -6.2088, 106.8456, Units::Imperial)));
        assert!(!key.matches(&LocationKey::new("Jakarta", -6.3, 106.8456, Units::Metric)));
    }

    #[test]
    fn test_units_parsing() {
        assert_eq!("Imperial".parse::<Units>(), Ok(Units::Imperial));
        assert_eq!(" metric ".parse::<Units>(), Ok(Units::Metric));
        assert!("kelvin".parse::<Units>().is_err());
    }

    #[test]
    fn test_record_layout() {
        let key = LocationKey::new("Oslo", 59.91, 10.75, Units::Metric);
        let record = CacheRecord::new(
            &key,
            StableForecast {
                temp_high: 21,
                temp_low: 12,
                sunrise: 1_717_205_000,
                sunset: 1_717_270_000,
                city_name: "Oslo".to_string(),
                country: "NO".to_string(),
                timezone_offset: 7200,
            },
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            DateTime::from_timestamp(1_717_230_000, 0).unwrap(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["created_on_date"], "2024-06-01");
        assert_eq!(json["units"], "metric");
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["forecast"]["temp_high"], 21);
        assert_eq!(json["forecast"]["city_name"], "Oslo");
        assert_eq!(json["forecast"]["timezone_offset"], 7200);
        assert!(record.location_key().matches(&key));
    }

    #[test]
    fn test_record_survives_the_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::<CacheRecord>::new(dir.path().join("forecast_cache.json"));
        let key = LocationKey::new("Sydney", -33.8688, 151.2093, Units::Imperial);
        let record = CacheRecord::new(
            &key,
            StableForecast {
                temp_high: 64,
                temp_low: -3,
                sunrise: 1_717_188_000,
                sunset: 1_717_224_000,
                city_name: "Sydney".to_string(),
                country: "AU".to_string(),
                timezone_offset: 36_000,
            },
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            DateTime::from_timestamp(1_717_230_000, 123_456_789).unwrap(),
        );

        store.write(&record).unwrap();
        let loaded = store.read().unwrap();

        assert_eq!(loaded, record);
        assert_eq!(loaded.location_key(), key);
        assert_eq!(loaded.schema_version(), CacheRecord::SCHEMA_VERSION);
    }

    #[test]
    fn test_current_weather_decodes_minimal_payload() {
        let payload = r#"{
            "coord": {"lon": 10.75, "lat": 59.91},
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
            "main": {
                "temp": 18.4,
                "feels_like": 17.9,
                "temp_min": 16.0,
                "temp_max": 20.1,
                "humidity": 55
            },
            "dt": 1717230000,
            "name": "Oslo"
        }"#;
        let current: CurrentWeatherResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(current.weather[0].description, "clear sky");
        assert_eq!(current.wind.speed, 0.0);
        assert_eq!(current.timezone, 0);
    }
}
