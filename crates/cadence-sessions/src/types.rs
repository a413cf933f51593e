use cadence_core::{CycleInstants, MalformedTimeError, Schedule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Open,
    Closed,
    /// Set by the result-declaration path; the sweep never moves a session out of it.
    ResultDeclared,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
            SessionStatus::ResultDeclared => "result_declared",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(SessionStatus::Waiting),
            "open" => Ok(SessionStatus::Open),
            "closed" => Ok(SessionStatus::Closed),
            "result_declared" => Ok(SessionStatus::ResultDeclared),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Wall-clock marks exactly as stored. Parsed at the point of use so one
/// malformed row only affects its own session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleText {
    pub start: String,
    pub end: String,
    pub result: String,
}

impl ScheduleText {
    pub fn new(start: impl Into<String>, end: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            result: result.into(),
        }
    }

    pub fn parse(&self) -> Result<Schedule, MalformedTimeError> {
        Schedule::parse(&self.start, &self.end, &self.result)
    }
}

impl From<Schedule> for ScheduleText {
    fn from(schedule: Schedule) -> Self {
        Self {
            start: schedule.start.to_string(),
            end: schedule.end.to_string(),
            result: schedule.result.to_string(),
        }
    }
}

/// The projection a sweep pass needs: schedule plus status fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub schedule: ScheduleText,
    pub current_status: SessionStatus,
    pub accepting_bets: bool,
    pub is_result_pending: bool,
    pub has_declared_result: bool,
    /// Cached cycle instants, if a recompute has written a complete set.
    pub cached: Option<CycleInstants>,
}

/// A full persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// UUIDv7 primary key, time-sortable.
    pub id: String,
    pub name: String,
    pub schedule: ScheduleText,
    /// Inactive sessions are invisible to sweeps.
    pub is_active: bool,
    pub current_status: SessionStatus,
    /// True iff the session is open; moved in lockstep with `current_status`.
    pub accepting_bets: bool,
    /// The result mark has passed and no result has been declared yet.
    pub is_result_pending: bool,
    pub declared_result: Option<String>,
    pub forced_status: Option<SessionStatus>,
    pub last_status_change: Option<String>,
    pub auto_closed_at: Option<String>,
    pub result_declared_at: Option<String>,
    pub cached: Option<CycleInstants>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}

/// Input for creating a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub name: String,
    pub schedule: ScheduleText,
}

/// A partial status write issued by the sweep. Each variant is one
/// conditional single-row update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// `open`, accepting bets, override marker and last cycle's result flag cleared.
    Open { at: DateTime<Utc> },
    /// `closed`, not accepting bets, `auto_closed_at` stamped.
    Closed { at: DateTime<Utc> },
    /// `closed`, not accepting bets, result flagged as pending.
    ResultPending { at: DateTime<Utc> },
}

impl StatusUpdate {
    pub fn target_status(&self) -> SessionStatus {
        match self {
            StatusUpdate::Open { .. } => SessionStatus::Open,
            StatusUpdate::Closed { .. } | StatusUpdate::ResultPending { .. } => {
                SessionStatus::Closed
            }
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            StatusUpdate::Open { at }
            | StatusUpdate::Closed { at }
            | StatusUpdate::ResultPending { at } => *at,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusUpdate::Open { .. } => "open",
            StatusUpdate::Closed { .. } => "closed",
            StatusUpdate::ResultPending { .. } => "result_pending",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SessionStatus::Waiting,
            SessionStatus::Open,
            SessionStatus::Closed,
            SessionStatus::ResultDeclared,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("declared".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn schedule_text_reports_the_bad_mark() {
        let text = ScheduleText::new("10:00", "1O:02", "10:03");
        let err = text.parse().unwrap_err();
        assert_eq!(err.input, "1O:02");
    }

    #[test]
    fn result_pending_targets_closed() {
        let at = Utc::now();
        assert_eq!(
            StatusUpdate::ResultPending { at }.target_status(),
            SessionStatus::Closed
        );
        assert_eq!(StatusUpdate::Open { at }.target_status(), SessionStatus::Open);
    }
}
