use thiserror::Error;

/// Errors surfaced by a [`crate::store::SessionStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Timeout or connectivity failure; the next sweep tick is the retry.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// A conditional update's precondition no longer holds, e.g. the session
    /// was deactivated or its result declared between read and write.
    #[error("write conflict on session {id}")]
    WriteConflict { id: String },

    #[error("session not found: {id}")]
    NotFound { id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted row holds a value the model cannot represent.
    #[error("corrupt session row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the failure is expected to clear up by itself on a later tick.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
