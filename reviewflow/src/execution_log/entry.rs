//! Log entry and query filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Status recorded by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    /// The stage has started and not yet reported back.
    InProgress,
    /// The stage completed.
    Success,
    /// The stage failed.
    Error,
    /// The stage chose not to act.
    Skipped,
}

impl LogStatus {
    /// Returns true for statuses that close an in-progress entry.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    /// Entry identifier.
    pub uuid: Uuid,
    /// Owning execution (usually the job's correlation id).
    pub execution_id: String,
    /// Stable stage name.
    pub stage_name: String,
    /// Recorded status.
    pub status: LogStatus,
    /// Formatted, user-safe message.
    pub message: String,
    /// Free-form structured metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ExecutionLogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        execution_id: impl Into<String>,
        stage_name: impl Into<String>,
        status: LogStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            execution_id: execution_id.into(),
            stage_name: stage_name.into(),
            status,
            message: message.into(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Overrides the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns true if this entry belongs to `(execution_id, stage_name)`.
    #[must_use]
    pub fn is_for(&self, execution_id: &str, stage_name: &str) -> bool {
        self.execution_id == execution_id && self.stage_name == stage_name
    }
}

/// Predicate query over log entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Match this execution id.
    pub execution_id: Option<String>,
    /// Match this stage name.
    pub stage_name: Option<String>,
    /// Match this status.
    pub status: Option<LogStatus>,
    /// Match entries created strictly after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Return at most this many entries.
    pub limit: Option<usize>,
}

impl LogFilter {
    /// Creates a filter matching every entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one execution.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Restricts to one stage.
    #[must_use]
    pub fn with_stage_name(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }

    /// Restricts to one status.
    #[must_use]
    pub fn with_status(mut self, status: LogStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to entries newer than `instant`.
    #[must_use]
    pub fn with_created_after(mut self, instant: DateTime<Utc>) -> Self {
        self.created_after = Some(instant);
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `entry` satisfies every set predicate.
    #[must_use]
    pub fn matches(&self, entry: &ExecutionLogEntry) -> bool {
        self.execution_id
            .as_deref()
            .map_or(true, |id| entry.execution_id == id)
            && self
                .stage_name
                .as_deref()
                .map_or(true, |name| entry.stage_name == name)
            && self.status.map_or(true, |status| entry.status == status)
            && self
                .created_after
                .map_or(true, |after| entry.created_at > after)
    }
}
