//! `cadence-scheduler`: decides which state every session should be in and
//! keeps the session store in line with it.
//!
//! # Overview
//!
//! [`SweepScheduler`] runs two recurring jobs on tokio timers:
//!
//! | Job       | Cadence               | Work                                              |
//! |-----------|-----------------------|---------------------------------------------------|
//! | Sweep     | every 30 s            | [`status::phase_at`] per active session, minimal writes |
//! | Recompute | daily at 00:05 (ref.) | [`cycle::resolve_cycle`] per session, cache instants |
//!
//! Status is always derived from minute-of-day comparison against the
//! wall-clock schedule. Cached UTC instants are display data only.

pub mod cadence;
pub mod clock;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod status;
pub mod transition;
pub mod types;

pub use cadence::Cadence;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{SweepScheduler, SweepSettings};
pub use error::{Result, SchedulerError};
pub use status::SessionPhase;
pub use types::{RecomputeReport, ResultPendingNotice, SchedulerStatus, StartOutcome, SweepReport};
