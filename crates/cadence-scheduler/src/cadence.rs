use std::fmt;
use std::time::Duration as StdDuration;

use cadence_core::ScheduleTime;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Serialize, Serializer};

use crate::cycle::reference_date;

/// How often a recurring job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Repeat with a fixed period.
    Every(StdDuration),
    /// Fire once a day at a wall-clock mark in the reference timezone.
    DailyAt(ScheduleTime),
}

impl Cadence {
    /// Next fire time strictly after `from`.
    pub fn next_fire(&self, from: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        match self {
            Cadence::Every(period) => from + Duration::milliseconds(period.as_millis() as i64),

            Cadence::DailyAt(mark) => {
                // Today's candidate at HH:MM:00 in the reference timezone.
                let local = reference_date(from, offset).and_time(mark.to_naive_time());
                let candidate =
                    (local - Duration::seconds(offset.local_minus_utc() as i64)).and_utc();
                if candidate > from {
                    candidate
                } else {
                    // Today's mark has passed, advance to tomorrow.
                    candidate + Duration::days(1)
                }
            }
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Every(period) => write!(f, "every {}s", period.as_secs()),
            Cadence::DailyAt(mark) => write!(f, "daily at {mark}"),
        }
    }
}

impl Serialize for Cadence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(19_800).unwrap()
    }

    #[test]
    fn every_adds_the_period() {
        let from = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let next = Cadence::Every(StdDuration::from_secs(30)).next_fire(from, ist());
        assert_eq!(next, from + Duration::seconds(30));
    }

    #[test]
    fn daily_fires_at_the_next_reference_mark() {
        // 18:00 UTC on the 15th is 23:30 IST; 00:05 IST on the 16th is 18:35 UTC
        let from = Utc.with_ymd_and_hms(2026, 10, 15, 18, 0, 0).unwrap();
        let mark = ScheduleTime::parse("00:05").unwrap();
        let next = Cadence::DailyAt(mark).next_fire(from, ist());
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 15, 18, 35, 0).unwrap());
    }

    #[test]
    fn daily_rolls_to_tomorrow_once_the_mark_has_passed() {
        let mark = ScheduleTime::parse("00:05").unwrap();
        let fire = Utc.with_ymd_and_hms(2026, 10, 15, 18, 35, 0).unwrap();
        // exactly at the mark: strictly-after semantics push a full day
        let next = Cadence::DailyAt(mark).next_fire(fire, ist());
        assert_eq!(next, fire + Duration::days(1));
    }

    #[test]
    fn display_names_the_cadence() {
        assert_eq!(Cadence::Every(StdDuration::from_secs(30)).to_string(), "every 30s");
        let mark = ScheduleTime::parse("00:05").unwrap();
        assert_eq!(Cadence::DailyAt(mark).to_string(), "daily at 00:05");
    }
}
