use thiserror::Error;

/// A wall-clock string that is not a well-formed `HH:MM` time of day.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed time of day {input:?}: {reason}")]
pub struct MalformedTimeError {
    pub input: String,
    pub reason: &'static str,
}

impl MalformedTimeError {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CadenceError {
    /// Short error code string, logged alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
