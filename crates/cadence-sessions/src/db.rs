use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sessions table and its index.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id                  TEXT    NOT NULL PRIMARY KEY,
            name                TEXT    NOT NULL,
            start_time          TEXT    NOT NULL,   -- HH:MM, reference timezone
            end_time            TEXT    NOT NULL,
            result_time         TEXT    NOT NULL,
            is_active           INTEGER NOT NULL DEFAULT 1,
            current_status      TEXT    NOT NULL DEFAULT 'waiting',
            accepting_bets      INTEGER NOT NULL DEFAULT 0,
            is_result_pending   INTEGER NOT NULL DEFAULT 0,
            declared_result     TEXT,               -- opaque payload or NULL
            forced_status       TEXT,               -- administrator override marker
            last_status_change  TEXT,               -- ISO-8601 or NULL
            auto_closed_at      TEXT,
            result_declared_at  TEXT,
            cycle_anchor        TEXT,               -- YYYY-MM-DD of the cached cycle
            start_instant_utc   TEXT,
            end_instant_utc     TEXT,
            result_instant_utc  TEXT,
            created_at          TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL
        ) STRICT;

        -- Sweep query: SELECT … WHERE is_active = 1
        CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions (is_active);
        ",
    )?;
    Ok(())
}
