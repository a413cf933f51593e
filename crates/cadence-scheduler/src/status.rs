//! The status state machine.
//!
//! Status is recomputed from scratch on every tick by comparing the current
//! wall-clock minute with the schedule's three marks. The comparison does not
//! depend on the calendar date, so no daily reset is needed.

use cadence_core::{Schedule, MINUTES_PER_DAY};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// The state a session should be in right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Waiting,
    Open,
    Closed,
    ResultTime,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Waiting => "waiting",
            SessionPhase::Open => "open",
            SessionPhase::Closed => "closed",
            SessionPhase::ResultTime => "result_time",
        };
        f.write_str(s)
    }
}

/// Wall-clock minute of day (0..1440) of `now` in the reference timezone.
pub fn reference_minute(now: DateTime<Utc>, offset: FixedOffset) -> u16 {
    let local = now.with_timezone(&offset);
    (local.hour() * 60 + local.minute()) as u16
}

/// Phase of `schedule` at `now`, read in the reference timezone.
pub fn phase_at(now: DateTime<Utc>, schedule: &Schedule, offset: FixedOffset) -> SessionPhase {
    phase_at_minute(reference_minute(now, offset), schedule)
}

/// Phase of `schedule` at wall-clock minute `current` (0..1440).
///
/// A boundary minute always belongs to the later state: at exactly the end
/// mark the window is no longer open.
pub fn phase_at_minute(current: u16, schedule: &Schedule) -> SessionPhase {
    let cur = current % MINUTES_PER_DAY;
    let start = schedule.start.minute_of_day();
    let end = schedule.end.minute_of_day();
    let result = schedule.result.minute_of_day();

    if end > start {
        // Window opens and closes on the same day.
        if start <= cur && cur < end {
            return SessionPhase::Open;
        }
        if result >= end {
            if end <= cur && cur < result {
                return SessionPhase::Closed;
            }
            if cur >= result {
                return SessionPhase::ResultTime;
            }
        } else {
            // Result falls on the following day.
            if cur >= end {
                return SessionPhase::Closed;
            }
            if cur < start && cur >= result {
                return SessionPhase::ResultTime;
            }
        }
        SessionPhase::Waiting
    } else {
        // Window spans midnight.
        if cur >= start || cur < end {
            return SessionPhase::Open;
        }
        if result > end {
            if end <= cur && cur < result {
                return SessionPhase::Closed;
            }
            if result <= cur && cur < start {
                return SessionPhase::ResultTime;
            }
        } else {
            if (end <= cur && cur < MINUTES_PER_DAY) || cur < result {
                return SessionPhase::Closed;
            }
            if result <= cur && cur < start {
                return SessionPhase::ResultTime;
            }
        }
        SessionPhase::Waiting
    }
}
