//! Wall-clock schedule → absolute UTC instants for one daily cycle.

use cadence_core::{CycleInstants, Schedule, ScheduleTime};
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, Utc};

use crate::status::SessionPhase;

/// Calendar day of `now` in the reference timezone.
pub fn reference_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Resolve the cycle of `schedule` that opens on `anchor`.
///
/// An end mark strictly before the start mark lands on the next day. The
/// result mark is placed on the end's day, or the day after when it is
/// strictly before the end mark.
pub fn resolve_cycle(anchor: NaiveDate, schedule: &Schedule, offset: FixedOffset) -> CycleInstants {
    let start_m = schedule.start.minute_of_day();
    let end_m = schedule.end.minute_of_day();
    let result_m = schedule.result.minute_of_day();

    let end_day = if end_m < start_m {
        anchor + Days::new(1)
    } else {
        anchor
    };
    let result_day = if result_m < end_m {
        end_day + Days::new(1)
    } else {
        end_day
    };

    CycleInstants {
        anchor,
        start: to_utc(anchor, schedule.start, offset),
        end: to_utc(end_day, schedule.end, offset),
        result: to_utc(result_day, schedule.result, offset),
    }
}

/// Local wall-clock mark on `day` minus the fixed offset.
fn to_utc(day: NaiveDate, mark: ScheduleTime, offset: FixedOffset) -> DateTime<Utc> {
    let local = day.and_time(mark.to_naive_time());
    (local - Duration::seconds(offset.local_minus_utc() as i64)).and_utc()
}

/// Phase derived from absolute instants instead of minute-of-day comparison.
///
/// Diagnostic only: the sweep never consults it. `today` and `yesterday` are
/// the cycles anchored on the reference date of `now` and the day before.
/// The cycle that has most recently opened is evaluated; `closed` and
/// `result_time` only hold on the reference day their mark falls on.
pub fn phase_from_instants(
    now: DateTime<Utc>,
    today: &CycleInstants,
    yesterday: &CycleInstants,
    offset: FixedOffset,
) -> SessionPhase {
    let cycle = if now >= today.start { today } else { yesterday };
    let day = reference_date(now, offset);

    if cycle.start <= now && now < cycle.end {
        SessionPhase::Open
    } else if cycle.end <= now && now < cycle.result && reference_date(cycle.end, offset) == day {
        SessionPhase::Closed
    } else if cycle.result <= now && reference_date(cycle.result, offset) == day {
        SessionPhase::ResultTime
    } else {
        SessionPhase::Waiting
    }
}

/// Resolve today's and yesterday's cycles and evaluate [`phase_from_instants`].
pub fn phase_by_instants(now: DateTime<Utc>, schedule: &Schedule, offset: FixedOffset) -> SessionPhase {
    let day = reference_date(now, offset);
    let today = resolve_cycle(day, schedule, offset);
    let yesterday = resolve_cycle(day - Days::new(1), schedule, offset);
    phase_from_instants(now, &today, &yesterday, offset)
}
