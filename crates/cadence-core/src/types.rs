use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, MalformedTimeError};

/// Minutes in one wall-clock day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A wall-clock time of day in the reference timezone, serialised as `"HH:MM"`.
///
/// Internally kept as minute-of-day so comparisons are plain integer compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleTime(u16);

impl ScheduleTime {
    /// Parse a strict `HH:MM` string (two zero-padded digits each side).
    pub fn parse(input: &str) -> Result<Self, MalformedTimeError> {
        let bytes = input.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(MalformedTimeError::new(input, "expected HH:MM"));
        }
        let hour = two_digits(&bytes[0..2])
            .ok_or_else(|| MalformedTimeError::new(input, "hour is not two digits"))?;
        let minute = two_digits(&bytes[3..5])
            .ok_or_else(|| MalformedTimeError::new(input, "minute is not two digits"))?;
        if hour >= 24 {
            return Err(MalformedTimeError::new(input, "hour must be below 24"));
        }
        if minute >= 60 {
            return Err(MalformedTimeError::new(input, "minute must be below 60"));
        }
        Ok(Self(hour * 60 + minute))
    }

    pub fn from_minute_of_day(minute: u16) -> Result<Self, MalformedTimeError> {
        if minute >= MINUTES_PER_DAY {
            return Err(MalformedTimeError::new(
                minute.to_string(),
                "minute of day must be below 1440",
            ));
        }
        Ok(Self(minute))
    }

    pub fn minute_of_day(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    /// The same wall-clock mark as a chrono time with seconds zeroed.
    pub fn to_naive_time(self) -> NaiveTime {
        // hour < 24 and minute < 60 by construction
        NaiveTime::from_hms_opt(self.hour() as u32, self.minute() as u32, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

fn two_digits(pair: &[u8]) -> Option<u16> {
    match pair {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some(((a - b'0') * 10 + (b - b'0')) as u16)
        }
        _ => None,
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ScheduleTime {
    type Err = MalformedTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ScheduleTime {
    type Error = MalformedTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScheduleTime> for String {
    fn from(value: ScheduleTime) -> Self {
        value.to_string()
    }
}

/// The three daily marks of a session: window opens, window closes, result is due.
///
/// No ordering is enforced between the marks; an end at or before the start
/// means the open window spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: ScheduleTime,
    pub end: ScheduleTime,
    pub result: ScheduleTime,
}

impl Schedule {
    pub fn new(start: ScheduleTime, end: ScheduleTime, result: ScheduleTime) -> Self {
        Self { start, end, result }
    }

    /// Parse all three marks; the first malformed one is reported.
    pub fn parse(start: &str, end: &str, result: &str) -> Result<Self, MalformedTimeError> {
        Ok(Self {
            start: ScheduleTime::parse(start)?,
            end: ScheduleTime::parse(end)?,
            result: ScheduleTime::parse(result)?,
        })
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end.minute_of_day() <= self.start.minute_of_day()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} (result {})", self.start, self.end, self.result)
    }
}

/// Absolute instants of one daily cycle, anchored to a calendar day in the
/// reference timezone.
///
/// Derived data: cached on each session for display and diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleInstants {
    /// Reference-timezone calendar day the cycle was anchored to.
    pub anchor: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub result: DateTime<Utc>,
}

/// Parse a fixed UTC offset written as `+HH:MM` or `-HH:MM`.
pub fn parse_utc_offset(input: &str) -> Result<FixedOffset, CadenceError> {
    let (sign, rest) = match input.as_bytes().first() {
        Some(b'+') => (1, &input[1..]),
        Some(b'-') => (-1, &input[1..]),
        _ => {
            return Err(CadenceError::Config(format!(
                "utc offset {input:?} must start with '+' or '-'"
            )))
        }
    };
    let magnitude = ScheduleTime::parse(rest)
        .map_err(|e| CadenceError::Config(format!("utc offset {input:?}: {e}")))?;
    let seconds = sign * magnitude.minute_of_day() as i32 * 60;
    FixedOffset::east_opt(seconds)
        .ok_or_else(|| CadenceError::Config(format!("utc offset {input:?} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_converts_to_minute_of_day() {
        assert_eq!(ScheduleTime::parse("00:00").unwrap().minute_of_day(), 0);
        assert_eq!(ScheduleTime::parse("09:00").unwrap().minute_of_day(), 540);
        assert_eq!(ScheduleTime::parse("23:59").unwrap().minute_of_day(), 1439);
    }

    #[test]
    fn parse_rejects_malformed_strings() {
        for bad in ["24:00", "12:60", "9:00", "09:5", "0900", "ab:cd", "", "09:00 ", "+9:00"] {
            let err = ScheduleTime::parse(bad).unwrap_err();
            assert_eq!(err.input, bad);
        }
    }

    #[test]
    fn display_is_zero_padded() {
        let t = ScheduleTime::from_minute_of_day(65).unwrap();
        assert_eq!(t.to_string(), "01:05");
        assert!(ScheduleTime::from_minute_of_day(1440).is_err());
    }

    #[test]
    fn serde_uses_hh_mm_string() {
        let t = ScheduleTime::parse("10:02").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), r#""10:02""#);
        let back: ScheduleTime = serde_json::from_str(r#""10:02""#).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<ScheduleTime>(r#""25:00""#).is_err());
    }

    #[test]
    fn equal_start_and_end_counts_as_crossing_midnight() {
        assert!(Schedule::parse("23:00", "01:00", "02:00").unwrap().crosses_midnight());
        assert!(Schedule::parse("10:00", "10:00", "11:00").unwrap().crosses_midnight());
        assert!(!Schedule::parse("09:00", "12:00", "13:00").unwrap().crosses_midnight());
    }

    #[test]
    fn parse_utc_offset_accepts_signed_hh_mm() {
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_utc_offset("-04:00").unwrap().local_minus_utc(), -14_400);
        assert!(parse_utc_offset("05:30").is_err());
        assert!(parse_utc_offset("+5:30").is_err());
    }
}
