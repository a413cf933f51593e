//! `cadence-sessions`: session records and the store the sweep scheduler
//! reads from and writes to.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::{SessionStore, SqliteSessionStore};
pub use types::{NewSession, ScheduleText, Session, SessionStatus, SessionView, StatusUpdate};
