use super::types::*;
use crate::clock::LocalDay;

/// Cached stable fields plus freshly fetched live fields.
///
/// Only the live subset is replaced; stable fields pass through untouched.
pub fn merge_cached(stable: &StableForecast, live: LiveConditions) -> Forecast {
    Forecast {
        stable: stable.clone(),
        live,
        source: ForecastSource::CachedStable,
    }
}

/// Builds a full-fetch result for `day` from both OpenWeather payloads.
pub fn from_full_fetch(
    forecast: &Forecast3hResponse,
    current: &CurrentWeatherResponse,
    day: &LocalDay,
) -> Forecast {
    Forecast {
        stable: stable_for_day(forecast, current, day),
        live: live_from_current(current),
        source: ForecastSource::Full,
    }
}

pub fn live_from_current(current: &CurrentWeatherResponse) -> LiveConditions {
    let conditions = current
        .weather
        .first()
        .map(|w| w.description.clone())
        .unwrap_or_default();

    LiveConditions {
        current_temp: current.main.temp,
        feels_like: current.main.feels_like,
        humidity: current.main.humidity,
        wind_speed: current.wind.speed,
        conditions,
        observed_at: current.dt,
    }
}

/// High and low for `day`, the same day the cache record is keyed on.
///
/// Bounded by the 3-hour slots falling on `day` and by the current
/// observation. Late in the evening no slot may be left; the observation
/// alone then bounds the day. Slots on other days never contribute.
pub fn stable_for_day(
    forecast: &Forecast3hResponse,
    current: &CurrentWeatherResponse,
    day: &LocalDay,
) -> StableForecast {
    let observed = current.main.temp;
    let (low, high) = forecast
        .list
        .iter()
        .filter(|item| day.contains(item.dt))
        .fold((observed, observed), |(low, high), item| {
            (low.min(item.main.temp_min), high.max(item.main.temp_max))
        });

    StableForecast {
        temp_high: high.round() as i32,
        temp_low: low.round() as i32,
        sunrise: forecast.city.sunrise,
        sunset: forecast.city.sunset,
        city_name: forecast.city.name.clone(),
        country: forecast.city.country.clone(),
        timezone_offset: forecast.city.timezone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    fn stable(high: i32, low: i32) -> StableForecast {
        StableForecast {
            temp_high: high,
            temp_low: low,
            sunrise: 1_000,
            sunset: 2_000,
            city_name: "Austin".to_string(),
            country: "US".to_string(),
            timezone_offset: -5 * 3600,
        }
    }

    fn live(current: f64) -> LiveConditions {
        LiveConditions {
            current_temp: current,
            feels_like: current,
            humidity: 40.0,
            wind_speed: 3.0,
            conditions: "few clouds".to_string(),
            observed_at: 1_500,
        }
    }

    fn main(temp: f64, min: f64, max: f64) -> WeatherMain {
        WeatherMain {
            temp,
            feels_like: temp,
            temp_min: min,
            temp_max: max,
            humidity: 50.0,
        }
    }

    fn item(dt: i64, min: f64, max: f64) -> Forecast3hItem {
        Forecast3hItem {
            dt,
            main: main((min + max) / 2.0, min, max),
            weather: Vec::new(),
            pop: 0.0,
        }
    }

    fn response(list: Vec<Forecast3hItem>) -> Forecast3hResponse {
        Forecast3hResponse {
            cnt: list.len() as i32,
            list,
            city: Forecast3hCity {
                id: 1,
                name: "Austin".to_string(),
                coord: Coord {
                    lat: 30.27,
                    lon: -97.74,
                },
                country: "US".to_string(),
                timezone: -5 * 3600,
                sunrise: 1_000,
                sunset: 2_000,
            },
        }
    }

    fn current(temp: f64, dt: i64) -> CurrentWeatherResponse {
        CurrentWeatherResponse {
            coord: Coord {
                lat: 30.27,
                lon: -97.74,
            },
            weather: Vec::new(),
            main: main(temp, temp - 3.0, temp + 3.0),
            wind: Wind::default(),
            dt,
            timezone: -5 * 3600,
            name: "Austin".to_string(),
        }
    }

    fn ts(day: u32, hour: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0)
            .unwrap()
            .timestamp()
    }

    /// Slots around 2024-06-02 in Chicago (UTC-5 in June).
    fn austin_slots() -> Vec<Forecast3hItem> {
        vec![
            // Jun 1, 22:00 local
            item(ts(2, 3), 20.0, 21.0),
            // Jun 2, 10:00 local
            item(ts(2, 15), 25.0, 33.0),
            // Jun 2, 16:00 local
            item(ts(2, 21), 28.0, 38.6),
            // Jun 3, 01:00 local
            item(ts(3, 6), 10.0, 45.0),
        ]
    }

    #[test]
    fn test_merge_keeps_stable_and_replaces_live() {
        let merged = merge_cached(&stable(80, 60), live(75.0));

        assert_eq!(merged.stable, stable(80, 60));
        assert_eq!(merged.live, live(75.0));
        assert_eq!(merged.source, ForecastSource::CachedStable);

        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["temp_high"], 80);
        assert_eq!(json["temp_low"], 60);
        assert_eq!(json["current_temp"], 75.0);
    }

    #[test]
    fn test_high_low_use_slots_on_the_given_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 14, 0, 0).unwrap();
        let day = LocalDay::of(now, chrono_tz::America::Chicago);

        let observed = current(27.0, now.timestamp());
        let stable = stable_for_day(&response(austin_slots()), &observed, &day);
        assert_eq!(stable.temp_high, 39);
        assert_eq!(stable.temp_low, 25);
        assert_eq!(stable.timezone_offset, -5 * 3600);
        assert_eq!(stable.city_name, "Austin");
    }

    #[test]
    fn test_day_boundary_follows_the_day_timezone() {
        // Same instant, evaluated as a UTC day: the Jun 1 evening slot
        // (03:00 UTC) now belongs to the day.
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 14, 0, 0).unwrap();
        let day = LocalDay::of(now, Tz::UTC);

        let observed = current(27.0, now.timestamp());
        let stable = stable_for_day(&response(austin_slots()), &observed, &day);
        assert_eq!(stable.temp_high, 39);
        assert_eq!(stable.temp_low, 20);
    }

    #[test]
    fn test_evening_never_borrows_the_next_day() {
        // Jun 1, 20:00 in Chicago: only the 22:00 slot is still today.
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 1, 0, 0).unwrap();
        let day = LocalDay::of(now, chrono_tz::America::Chicago);

        let observed = current(23.0, now.timestamp());
        let forecast = from_full_fetch(&response(austin_slots()), &observed, &day);
        assert_eq!(forecast.stable.temp_high, 23);
        assert_eq!(forecast.stable.temp_low, 20);
        assert_eq!(forecast.source, ForecastSource::Full);
        assert_eq!(forecast.live.current_temp, 23.0);
    }

    #[test]
    fn test_no_slots_left_uses_observation() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 4, 30, 0).unwrap();
        let day = LocalDay::of(now, chrono_tz::America::Chicago);
        let late = vec![item(ts(3, 6), 10.0, 45.0)];

        let stable = stable_for_day(&response(late), &current(18.4, now.timestamp()), &day);
        assert_eq!((stable.temp_high, stable.temp_low), (18, 18));
    }
}
