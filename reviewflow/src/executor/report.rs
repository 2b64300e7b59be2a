//! Execution outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::FailureRecord;
use crate::stages::WaitRequest;

/// Executor state for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// Not yet started.
    NotStarted,
    /// Running stages.
    Running,
    /// Every stage was resolved.
    Completed,
    /// A fatal failure stopped the run.
    Aborted,
    /// A stage is waiting for an external event.
    Paused,
    /// The run was cancelled between stages.
    Cancelled,
}

impl ExecutionState {
    /// Returns true if the invocation has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Running)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How a single stage resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Returned a new context.
    Completed,
    /// Chose not to act.
    Skipped,
    /// Raised a failure.
    Failed,
    /// Asked to wait for an external event.
    Paused,
}

/// Per-stage line in an [`ExecutionReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage_name: String,
    /// Resolution.
    pub status: StageStatus,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Formatted skip reason or error message.
    pub message: Option<String>,
}

/// Result of a run that was not aborted.
#[derive(Debug, Clone)]
pub struct ExecutionReport<C> {
    /// Pipeline name.
    pub pipeline: String,
    /// Final state: completed, paused or cancelled.
    pub state: ExecutionState,
    /// Last good context.
    pub context: C,
    /// Stage the run started at.
    pub started_at_stage: Option<String>,
    /// Per-stage records in execution order.
    pub stages: Vec<StageRecord>,
    /// Recoverable failures.
    pub failures: Vec<FailureRecord>,
    /// Stage that paused; the resume pointer.
    pub paused_at: Option<String>,
    /// What the paused stage waits for.
    pub wait: Option<WaitRequest>,
    /// Stage that was not started because the run was cancelled.
    pub cancelled_before: Option<String>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
}

impl<C> ExecutionReport<C> {
    pub(crate) fn new(pipeline: String, context: C) -> Self {
        Self {
            pipeline,
            state: ExecutionState::NotStarted,
            context,
            started_at_stage: None,
            stages: Vec::new(),
            failures: Vec::new(),
            paused_at: None,
            wait: None,
            cancelled_before: None,
            cancel_reason: None,
        }
    }

    /// Returns true if one or more stages failed recoverably.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns true if this invocation ran stages and every one skipped.
    #[must_use]
    pub fn all_skipped(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.status == StageStatus::Skipped)
    }

    /// Returns the stage names with the given status.
    #[must_use]
    pub fn stages_with(&self, status: StageStatus) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.stage_name.as_str())
            .collect()
    }

    /// Returns the total stage time in milliseconds.
    #[must_use]
    pub fn total_duration_ms(&self) -> f64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }
}
