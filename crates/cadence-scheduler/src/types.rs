use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::cadence::Cadence;

/// Outcome of [`crate::SweepScheduler::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Counters from one sweep pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// The instant every session in the pass was evaluated against.
    pub at: DateTime<Utc>,
    pub examined: usize,
    pub opened: usize,
    pub closed: usize,
    pub result_pending: usize,
    /// Persisted state already matched; no write issued.
    pub unchanged: usize,
    /// Skipped because a schedule string did not parse.
    pub malformed: usize,
    /// Conditional write lost to a concurrent change; re-evaluated next tick.
    pub conflicts: usize,
    pub failed: usize,
}

impl SweepReport {
    pub(crate) fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            examined: 0,
            opened: 0,
            closed: 0,
            result_pending: 0,
            unchanged: 0,
            malformed: 0,
            conflicts: 0,
            failed: 0,
        }
    }

    /// Number of status writes that landed.
    pub fn writes(&self) -> usize {
        self.opened + self.closed + self.result_pending
    }
}

/// Counters from one cycle-instant recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    /// Reference-timezone day the cycles were anchored to.
    pub anchor: NaiveDate,
    pub forced: bool,
    pub examined: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub malformed: usize,
    pub failed: usize,
}

/// Snapshot returned by [`crate::SweepScheduler::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub cadence: Cadence,
    pub daily_recompute: Cadence,
    pub next_sweep_at: Option<DateTime<Utc>>,
    pub next_recompute_at: Option<DateTime<Utc>>,
    pub last_sweep: Option<SweepReport>,
    pub last_recompute: Option<RecomputeReport>,
}

/// Sent when a sweep raises a session's result-pending flag, so the
/// result-declaration side can pick it up without the sweep calling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultPendingNotice {
    pub session_id: String,
    pub name: String,
    pub flagged_at: DateTime<Utc>,
}
