//! `cadence-core`: shared value types, configuration and errors.
//!
//! Every schedule mark is a wall-clock `HH:MM` in one fixed reference
//! timezone; [`types::ScheduleTime`] keeps it as a minute of day.

pub mod config;
pub mod error;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, MalformedTimeError, Result};
pub use types::{parse_utc_offset, CycleInstants, Schedule, ScheduleTime, MINUTES_PER_DAY};
