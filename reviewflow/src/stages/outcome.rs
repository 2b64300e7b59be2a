//! Stage outcome types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reason::PipelineReason;

/// What a stage asks the engine to wait for before the job continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitRequest {
    /// The event type to match (e.g. `ast.task.completed`).
    pub event_type: String,
    /// The event key to match (e.g. a task id).
    pub event_key: String,
    /// How long to wait before the job times out.
    pub timeout: Duration,
}

impl WaitRequest {
    /// Creates a new wait request.
    #[must_use]
    pub fn new(event_type: impl Into<String>, event_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            event_type: event_type.into(),
            event_key: event_key.into(),
            timeout,
        }
    }
}

/// The result of a stage that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<C> {
    /// The stage acted and derived a new context.
    Completed(C),
    /// The stage chose not to act; the incoming context is carried forward.
    Skipped {
        /// Why the stage skipped.
        reason: PipelineReason,
        /// Optional technical suffix for the formatted message.
        technical: Option<String>,
    },
    /// The stage started external work and the job must wait for it.
    Paused {
        /// The context to persist until the job resumes.
        context: C,
        /// The event to wait for.
        wait: WaitRequest,
    },
}

impl<C> StageOutcome<C> {
    /// Creates a completed outcome.
    pub fn completed(context: C) -> Self {
        Self::Completed(context)
    }

    /// Creates a skip outcome.
    pub fn skipped(reason: PipelineReason) -> Self {
        Self::Skipped {
            reason,
            technical: None,
        }
    }

    /// Creates a skip outcome with a technical suffix.
    pub fn skipped_with_technical(reason: PipelineReason, technical: impl Into<String>) -> Self {
        Self::Skipped {
            reason,
            technical: Some(technical.into()),
        }
    }

    /// Creates a pause outcome.
    pub fn paused(context: C, wait: WaitRequest) -> Self {
        Self::Paused { context, wait }
    }

    /// Returns true for a skip.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns true for a pause.
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Returns the carried context, if the outcome has one.
    pub fn into_context(self) -> Option<C> {
        match self {
            Self::Completed(context) | Self::Paused { context, .. } => Some(context),
            Self::Skipped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        let done: StageOutcome<u8> = StageOutcome::completed(1);
        assert!(!done.is_skipped());
        assert!(!done.is_paused());

        let skipped: StageOutcome<u8> = StageOutcome::skipped_with_technical(
            PipelineReason::new("Draft PR"),
            "runOnDraft=false",
        );
        assert!(skipped.is_skipped());
        assert_eq!(skipped.into_context(), None);

        let paused = StageOutcome::paused(
            7u8,
            WaitRequest::new("ast.task.completed", "task-123", Duration::from_secs(60)),
        );
        assert!(paused.is_paused());
        assert_eq!(paused.into_context(), Some(7));
    }
}
