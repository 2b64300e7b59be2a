//! Fatal/recoverable classification of stage failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::StageError;

/// How to handle stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Every failure aborts the run.
    FailFast,
    /// Every failure is recorded and the run continues.
    ContinueOnFailure,
    /// The stage's declared [`StageErrorKind`](crate::errors::StageErrorKind) decides.
    #[default]
    ByErrorKind,
}

/// Failure policy owned by the executor configuration, not the stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Base mode.
    pub mode: FailureMode,
    /// Stages whose failures always abort.
    pub critical_stages: HashSet<String>,
}

impl FailurePolicy {
    /// Creates a policy with `mode` and no critical stages.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            critical_stages: HashSet::new(),
        }
    }

    /// Marks a stage as critical.
    #[must_use]
    pub fn with_critical_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.critical_stages.insert(stage_name.into());
        self
    }

    /// Returns true if `error` raised by `stage_name` must abort the run.
    #[must_use]
    pub fn is_fatal(&self, stage_name: &str, error: &StageError) -> bool {
        if self.critical_stages.contains(stage_name) {
            return true;
        }
        match self.mode {
            FailureMode::FailFast => true,
            FailureMode::ContinueOnFailure => false,
            FailureMode::ByErrorKind => error.is_fatal(),
        }
    }
}

/// Record of a stage failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name.
    pub stage: String,
    /// The failure as raised.
    pub error: StageError,
    /// Whether the policy treated it as fatal.
    pub fatal: bool,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(stage: impl Into<String>, error: StageError, fatal: bool) -> Self {
        Self {
            stage: stage.into(),
            error,
            fatal,
            timestamp: Utc::now(),
        }
    }
}
