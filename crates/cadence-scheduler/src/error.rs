use cadence_core::MalformedTimeError;
use cadence_sessions::StoreError;
use thiserror::Error;

/// Errors that can occur within the sweep scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A session's schedule string could not be parsed.
    #[error(transparent)]
    MalformedTime(#[from] MalformedTimeError),

    /// The session store failed or timed out.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The scheduler settings cannot be used.
    #[error("invalid scheduler settings: {0}")]
    InvalidSettings(String),
}

impl SchedulerError {
    /// Short error code string for operator-facing responses.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::MalformedTime(_) => "MALFORMED_TIME",
            SchedulerError::Store(e) if e.is_transient() => "STORE_UNAVAILABLE",
            SchedulerError::Store(_) => "STORE_ERROR",
            SchedulerError::InvalidSettings(_) => "INVALID_SETTINGS",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
