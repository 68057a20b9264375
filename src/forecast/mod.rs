pub mod cache;
pub mod merge;
pub mod openweather;
pub mod types;

pub use cache::ForecastCache;
pub use openweather::{OpenWeatherClient, OpenWeatherError};
pub use types::{
    CacheRecord, Forecast, ForecastSource, LiveConditions, LocationKey, StableForecast, Units,
};
