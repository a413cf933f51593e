use cadence_sessions::{SessionStatus, SessionView, StatusUpdate};
use chrono::{DateTime, Utc};

use crate::status::SessionPhase;

/// Decide the write, if any, that brings `session` in line with `target`.
///
/// `None` means the persisted state already matches, so repeated passes at
/// the same instant never write twice.
pub fn plan_transition(
    target: SessionPhase,
    session: &SessionView,
    now: DateTime<Utc>,
) -> Option<StatusUpdate> {
    if session.current_status == SessionStatus::ResultDeclared {
        return None;
    }

    match target {
        SessionPhase::Waiting => None,

        SessionPhase::Open => {
            let in_sync = session.current_status == SessionStatus::Open && session.accepting_bets;
            (!in_sync).then_some(StatusUpdate::Open { at: now })
        }

        SessionPhase::Closed => {
            let in_sync =
                session.current_status == SessionStatus::Closed && !session.accepting_bets;
            (!in_sync).then_some(StatusUpdate::Closed { at: now })
        }

        SessionPhase::ResultTime => {
            if session.has_declared_result {
                return None;
            }
            let in_sync = session.current_status == SessionStatus::Closed
                && !session.accepting_bets
                && session.is_result_pending;
            (!in_sync).then_some(StatusUpdate::ResultPending { at: now })
        }
    }
}
