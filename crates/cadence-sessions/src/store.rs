use async_trait::async_trait;
use cadence_core::CycleInstants;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::{NewSession, ScheduleText, Session, SessionStatus, SessionView, StatusUpdate};

/// What the sweep scheduler needs from session persistence.
///
/// Every write is scoped to one session id, so independent sessions never
/// block each other and a redundant write is harmless.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions with `is_active = true`, projected to schedule + status fields.
    async fn list_active(&self) -> Result<Vec<SessionView>>;

    /// Conditionally apply a status write. Fails with
    /// [`StoreError::WriteConflict`] when the session is inactive or its
    /// result has already been declared.
    async fn apply_status(&self, id: &str, update: &StatusUpdate) -> Result<()>;

    /// Overwrite the cached cycle instants of one session.
    async fn update_cached_instants(&self, id: &str, instants: &CycleInstants) -> Result<()>;
}

const SESSION_COLUMNS: &str = "id, name, start_time, end_time, result_time, is_active,
    current_status, accepting_bets, is_result_pending, declared_result, forced_status,
    last_status_change, auto_closed_at, result_declared_at, cycle_anchor,
    start_instant_utc, end_instant_utc, result_instant_utc, created_at, updated_at";

/// SQLite-backed [`SessionStore`].
///
/// Wraps a single connection in an async `Mutex`; each call holds the lock
/// only for the duration of its own statements.
pub struct SqliteSessionStore {
    db: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Insert a new active session in the `waiting` state.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create(&self, new: &NewSession) -> Result<Session> {
        let id = Uuid::now_v7().to_string();
        let now = timestamp(Utc::now());
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sessions
             (id, name, start_time, end_time, result_time, is_active, current_status,
              accepting_bets, is_result_pending, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 'waiting', 0, 0, ?6, ?6)",
            rusqlite::params![
                id,
                new.name,
                new.schedule.start,
                new.schedule.end,
                new.schedule.result,
                now
            ],
        )?;
        info!(session_id = %id, "session created");

        let session = db.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            [&id],
            row_to_session,
        )?;
        Ok(session)
    }

    /// Retrieve a session by id, returning `None` if it does not exist.
    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        let db = self.db.lock().await;
        let session = db
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id],
                row_to_session,
            )
            .optional()
            .map_err(|e| match e {
                rusqlite::Error::FromSqlConversionFailure(_, _, cause) => {
                    StoreError::Corrupt(format!("session {id}: {cause}"))
                }
                other => StoreError::Database(other),
            })?;
        Ok(session)
    }

    /// Include or exclude a session from future sweeps.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let now = timestamp(Utc::now());
        let db = self.db.lock().await;
        let n = db.execute(
            "UPDATE sessions SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![active, now, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Record a declared result. This is the write path of the
    /// result-declaration collaborator; the sweep never calls it.
    #[instrument(skip(self, payload))]
    pub async fn declare_result(&self, id: &str, payload: &str) -> Result<()> {
        let now = timestamp(Utc::now());
        let db = self.db.lock().await;
        let n = db.execute(
            "UPDATE sessions
             SET current_status = 'result_declared', declared_result = ?1,
                 is_result_pending = 0, accepting_bets = 0,
                 result_declared_at = ?2, last_status_change = ?2, updated_at = ?2
             WHERE id = ?3",
            rusqlite::params![payload, now, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        info!(session_id = %id, "result declared");
        Ok(())
    }

    /// Administrator override: pin a status and leave the override marker set
    /// until the sweep next reopens the session.
    pub async fn force_status(&self, id: &str, status: SessionStatus) -> Result<()> {
        let now = timestamp(Utc::now());
        let db = self.db.lock().await;
        let n = db.execute(
            "UPDATE sessions
             SET current_status = ?1, forced_status = ?1, accepting_bets = ?2,
                 last_status_change = ?3, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![status.as_str(), status == SessionStatus::Open, now, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        warn!(session_id = %id, %status, "status forced by administrator");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn list_active(&self) -> Result<Vec<SessionView>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare_cached(
            "SELECT id, name, start_time, end_time, result_time, current_status,
                    accepting_bets, is_result_pending, declared_result IS NOT NULL,
                    cycle_anchor, start_instant_utc, end_instant_utc, result_instant_utc
             FROM sessions WHERE is_active = 1 ORDER BY created_at",
        )?;
        let rows: Vec<_> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,         // id
                    row.get::<_, String>(1)?,         // name
                    row.get::<_, String>(2)?,         // start_time
                    row.get::<_, String>(3)?,         // end_time
                    row.get::<_, String>(4)?,         // result_time
                    row.get::<_, String>(5)?,         // current_status
                    row.get::<_, bool>(6)?,           // accepting_bets
                    row.get::<_, bool>(7)?,           // is_result_pending
                    row.get::<_, bool>(8)?,           // has declared result
                    row.get::<_, Option<String>>(9)?, // cycle_anchor
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, Option<String>>(11)?,
                    row.get::<_, Option<String>>(12)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let views = rows
            .into_iter()
            .filter_map(
                |(
                    id,
                    name,
                    start,
                    end,
                    result,
                    status_str,
                    accepting_bets,
                    is_result_pending,
                    has_declared_result,
                    anchor,
                    start_utc,
                    end_utc,
                    result_utc,
                )| {
                    // One unreadable row must not hide the others from the sweep.
                    let current_status = match status_str.parse::<SessionStatus>() {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(session_id = %id, "skipping session: {e}");
                            return None;
                        }
                    };
                    Some(SessionView {
                        cached: cached_instants(anchor, start_utc, end_utc, result_utc),
                        id,
                        name,
                        schedule: ScheduleText { start, end, result },
                        current_status,
                        accepting_bets,
                        is_result_pending,
                        has_declared_result,
                    })
                },
            )
            .collect::<Vec<_>>();
        debug!(count = views.len(), "loaded active sessions");
        Ok(views)
    }

    async fn apply_status(&self, id: &str, update: &StatusUpdate) -> Result<()> {
        let at = timestamp(update.at());
        let db = self.db.lock().await;
        let sql = match update {
            StatusUpdate::Open { .. } => {
                "UPDATE sessions
                 SET current_status = 'open', accepting_bets = 1, forced_status = NULL,
                     is_result_pending = 0, last_status_change = ?1, updated_at = ?1
                 WHERE id = ?2 AND is_active = 1 AND current_status != 'result_declared'"
            }
            StatusUpdate::Closed { .. } => {
                "UPDATE sessions
                 SET current_status = 'closed', accepting_bets = 0,
                     auto_closed_at = ?1, last_status_change = ?1, updated_at = ?1
                 WHERE id = ?2 AND is_active = 1 AND current_status != 'result_declared'"
            }
            StatusUpdate::ResultPending { .. } => {
                "UPDATE sessions
                 SET current_status = 'closed', accepting_bets = 0, is_result_pending = 1,
                     last_status_change = ?1, updated_at = ?1
                 WHERE id = ?2 AND is_active = 1 AND current_status != 'result_declared'
                   AND declared_result IS NULL"
            }
        };
        let n = db.execute(sql, rusqlite::params![at, id])?;
        if n == 0 {
            let exists = db
                .query_row("SELECT 1 FROM sessions WHERE id = ?1", [id], |_| Ok(()))
                .optional()?
                .is_some();
            return Err(if exists {
                StoreError::WriteConflict { id: id.to_string() }
            } else {
                StoreError::NotFound { id: id.to_string() }
            });
        }
        Ok(())
    }

    async fn update_cached_instants(&self, id: &str, instants: &CycleInstants) -> Result<()> {
        let now = timestamp(Utc::now());
        let db = self.db.lock().await;
        let n = db.execute(
            "UPDATE sessions
             SET cycle_anchor = ?1, start_instant_utc = ?2, end_instant_utc = ?3,
                 result_instant_utc = ?4, updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![
                instants.anchor.to_string(),
                timestamp(instants.start),
                timestamp(instants.end),
                timestamp(instants.result),
                now,
                id
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

/// RFC3339 with whole seconds, so stored instants compare equal after a round trip.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A cached cycle only counts when all four columns are present and readable.
fn cached_instants(
    anchor: Option<String>,
    start: Option<String>,
    end: Option<String>,
    result: Option<String>,
) -> Option<CycleInstants> {
    Some(CycleInstants {
        anchor: NaiveDate::parse_from_str(anchor.as_deref()?, "%Y-%m-%d").ok()?,
        start: parse_timestamp(start.as_deref()?)?,
        end: parse_timestamp(end.as_deref()?)?,
        result: parse_timestamp(result.as_deref()?)?,
    })
}

/// Map a SQLite row (selected with `SESSION_COLUMNS`) to a `Session`.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status_str: String = row.get(6)?;
    let current_status = status_str.parse::<SessionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
    })?;
    // An unreadable override marker is dropped rather than failing the read.
    let forced_status = row
        .get::<_, Option<String>>(10)?
        .and_then(|s| s.parse::<SessionStatus>().ok());

    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        schedule: ScheduleText {
            start: row.get(2)?,
            end: row.get(3)?,
            result: row.get(4)?,
        },
        is_active: row.get(5)?,
        current_status,
        accepting_bets: row.get(7)?,
        is_result_pending: row.get(8)?,
        declared_result: row.get(9)?,
        forced_status,
        last_status_change: row.get(11)?,
        auto_closed_at: row.get(12)?,
        result_declared_at: row.get(13)?,
        cached: cached_instants(row.get(14)?, row.get(15)?, row.get(16)?, row.get(17)?),
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> SqliteSessionStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        SqliteSessionStore::new(conn)
    }

    fn new_session(name: &str) -> NewSession {
        NewSession {
            name: name.to_string(),
            schedule: ScheduleText::new("09:00", "12:00", "13:00"),
        }
    }

    #[tokio::test]
    async fn created_session_starts_waiting_and_active() {
        let store = store();
        let session = store.create(&new_session("morning")).await.unwrap();
        assert_eq!(session.current_status, SessionStatus::Waiting);
        assert!(session.is_active);
        assert!(!session.accepting_bets);
        assert!(session.cached.is_none());

        let fetched = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "morning");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_active_excludes_inactive_sessions() {
        let store = store();
        let a = store.create(&new_session("a")).await.unwrap();
        let b = store.create(&new_session("b")).await.unwrap();
        store.set_active(&b.id, false).await.unwrap();

        let views = store.list_active().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, a.id);
        assert_eq!(views[0].schedule.start, "09:00");
    }

    #[tokio::test]
    async fn open_write_clears_override_marker() {
        let store = store();
        let s = store.create(&new_session("s")).await.unwrap();
        store.force_status(&s.id, SessionStatus::Closed).await.unwrap();
        assert_eq!(
            store.get(&s.id).await.unwrap().unwrap().forced_status,
            Some(SessionStatus::Closed)
        );

        store
            .apply_status(&s.id, &StatusUpdate::Open { at: Utc::now() })
            .await
            .unwrap();
        let after = store.get(&s.id).await.unwrap().unwrap();
        assert_eq!(after.current_status, SessionStatus::Open);
        assert!(after.accepting_bets);
        assert!(after.forced_status.is_none());
        assert!(after.last_status_change.is_some());
    }

    #[tokio::test]
    async fn reopening_clears_a_stale_result_flag() {
        let store = store();
        let s = store.create(&new_session("s")).await.unwrap();
        store
            .apply_status(&s.id, &StatusUpdate::ResultPending { at: Utc::now() })
            .await
            .unwrap();
        assert!(store.get(&s.id).await.unwrap().unwrap().is_result_pending);

        store
            .apply_status(&s.id, &StatusUpdate::Open { at: Utc::now() })
            .await
            .unwrap();
        let after = store.get(&s.id).await.unwrap().unwrap();
        assert_eq!(after.current_status, SessionStatus::Open);
        assert!(!after.is_result_pending);
    }

    #[tokio::test]
    async fn closed_write_stamps_auto_close() {
        let store = store();
        let s = store.create(&new_session("s")).await.unwrap();
        store
            .apply_status(&s.id, &StatusUpdate::Closed { at: Utc::now() })
            .await
            .unwrap();
        let after = store.get(&s.id).await.unwrap().unwrap();
        assert_eq!(after.current_status, SessionStatus::Closed);
        assert!(!after.accepting_bets);
        assert!(after.auto_closed_at.is_some());
        assert!(!after.is_result_pending);
    }

    #[tokio::test]
    async fn declared_session_rejects_status_writes() {
        let store = store();
        let s = store.create(&new_session("s")).await.unwrap();
        store.declare_result(&s.id, "47").await.unwrap();

        let err = store
            .apply_status(&s.id, &StatusUpdate::Open { at: Utc::now() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));

        let after = store.get(&s.id).await.unwrap().unwrap();
        assert_eq!(after.current_status, SessionStatus::ResultDeclared);
        assert_eq!(after.declared_result.as_deref(), Some("47"));
        assert!(after.result_declared_at.is_some());
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let store = store();
        let err = store
            .apply_status("nope", &StatusUpdate::Closed { at: Utc::now() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn cached_instants_round_trip() {
        let store = store();
        let s = store.create(&new_session("s")).await.unwrap();
        let start = DateTime::parse_from_rfc3339("2026-10-16T03:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let instants = CycleInstants {
            anchor: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            start,
            end: start + chrono::Duration::hours(3),
            result: start + chrono::Duration::hours(4),
        };
        store.update_cached_instants(&s.id, &instants).await.unwrap();

        let views = store.list_active().await.unwrap();
        assert_eq!(views[0].cached, Some(instants));
    }

    #[tokio::test]
    async fn unknown_status_row_is_skipped_by_list_active() {
        let store = store();
        let good = store.create(&new_session("good")).await.unwrap();
        let bad = store.create(&new_session("bad")).await.unwrap();
        {
            let db = store.db.lock().await;
            db.execute(
                "UPDATE sessions SET current_status = 'paused' WHERE id = ?1",
                [&bad.id],
            )
            .unwrap();
        }
        let views = store.list_active().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, good.id);

        let err = store.get(&bad.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
