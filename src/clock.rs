//! Calendar clock used to decide what "today" is.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Timezone in which calendar days are evaluated.
    fn timezone(&self) -> Tz;

    /// Today, in [`timezone`](Self::timezone).
    fn local_day(&self) -> LocalDay {
        LocalDay::of(self.now(), self.timezone())
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// One calendar date in one timezone.
///
/// Cache records are keyed on it and forecast slots are selected with it, so
/// both always agree on which day "today" is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDay {
    pub date: NaiveDate,
    pub timezone: Tz,
}

impl LocalDay {
    pub fn of(instant: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            date: instant.with_timezone(&timezone).date_naive(),
            timezone,
        }
    }

    /// Whether the unix timestamp `ts` falls on this day.
    pub fn contains(&self, ts: i64) -> bool {
        DateTime::from_timestamp(ts, 0)
            .is_some_and(|dt| dt.with_timezone(&self.timezone).date_naive() == self.date)
    }
}

/// Wall clock, with "today" evaluated in `timezone`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    timezone: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            now: Mutex::new(now),
            timezone,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_today_follows_timezone() {
        // 20:00 UTC is already the next day in Jakarta (UTC+7).
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let utc = FixedClock::new(now, Tz::UTC);
        let jakarta = FixedClock::new(now, chrono_tz::Asia::Jakarta);

        assert_eq!(utc.local_day().date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(jakarta.local_day().date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn test_advance_crosses_midnight() {
        let clock = FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap(),
            Tz::UTC,
        );
        clock.advance(chrono::Duration::hours(1));
        assert_eq!(clock.local_day().date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());

        clock.set(Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap());
        assert_eq!(clock.local_day().date, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[test]
    fn test_local_day_contains() {
        // 2024-06-02 01:00 UTC is 2024-06-01 20:00 in Chicago (UTC-5).
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 1, 0, 0).unwrap();
        let chicago = LocalDay::of(now, chrono_tz::America::Chicago);
        assert_eq!(chicago.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());

        let ts = |h| Utc.with_ymd_and_hms(2024, 6, 2, h, 0, 0).unwrap().timestamp();
        assert!(chicago.contains(ts(4)));
        assert!(!chicago.contains(ts(5)));
        assert!(LocalDay::of(now, Tz::UTC).contains(ts(5)));
    }
}
