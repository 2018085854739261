//! Session log: a plain-text, append-only record of every action taken,
//! readable back into a [`ReductionConfig`](crate::pipeline::config::ReductionConfig).

mod log;
mod restore;

pub use log::{parse_session_log, sanitize_name, LogEntry, SessionLog};
pub use restore::RestoreReport;
