//! Per-stage audit trail.
//!
//! [`crate::observer::ExecutionLogObserver`] writes one [`ExecutionLogEntry`]
//! per stage attempt: `IN_PROGRESS` when the stage starts, then closed in
//! place with `SUCCESS`, `ERROR` or `SKIPPED`. An entry that is still
//! `IN_PROGRESS` therefore means the stage is running or paused, which is
//! what [`ExecutionLogRepository::find_latest_in_progress`] reports.

mod entry;
mod repository;

pub use entry::{ExecutionLogEntry, LogFilter, LogStatus};
pub use repository::{ExecutionLogRepository, InMemoryExecutionLogRepository, InProgressPolicy};
