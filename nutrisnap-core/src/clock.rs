//! Time source used for stamping entries.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn from_millis(ms: i64) -> Self {
        Self(DateTime::from_timestamp_millis(ms).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The local calendar date of an epoch-millisecond timestamp.
pub fn local_date(timestamp_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.with_timezone(&Local).date_naive())
}

/// Timestamp for an entry logged on `date` at time `now`.
///
/// Today's entries get `now`; entries for another day keep the current
/// local time of day on that date.
pub fn timestamp_for_day(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let local_now = now.with_timezone(&Local);
    if local_now.date_naive() == date {
        return now.timestamp_millis();
    }
    let naive = date.and_time(local_now.time());
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.timestamp_millis(),
        None => naive.and_utc().timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_millis() {
        let clock = FixedClock::from_millis(1_700_000_000_123);
        assert_eq!(clock.now_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_timestamp_for_today_is_now() {
        let now = Utc::now();
        let today = now.with_timezone(&Local).date_naive();
        assert_eq!(timestamp_for_day(today, now), now.timestamp_millis());
    }

    #[test]
    fn test_timestamp_for_other_day_lands_on_that_day() {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let ts = timestamp_for_day(date, now);
        assert_eq!(local_date(ts), Some(date));
    }
}
