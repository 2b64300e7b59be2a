//! Hooks the hosting worker uses to steer and checkpoint a run.

use async_trait::async_trait;

use super::StageStatus;
use crate::context::PipelineContext;
use crate::errors::Result;

/// What to do before the next stage starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlDecision {
    /// Run the stage.
    Continue,
    /// Stop the run without starting the stage.
    Cancel(String),
}

/// Consulted by the executor between stages.
///
/// Stages already running are never interrupted; cancellation only takes
/// effect at the next stage boundary.
#[async_trait]
pub trait RunControl<C: PipelineContext>: Send + Sync {
    /// Called before `stage_name` starts.
    async fn before_stage(&self, _stage_name: &str) -> ControlDecision {
        ControlDecision::Continue
    }

    /// Called after `stage_name` has been resolved (completed, skipped or
    /// recoverably failed, as told by `status`). `next_stage` is the new
    /// resume pointer, `None` once the last stage is done.
    ///
    /// # Errors
    ///
    /// An error aborts the run; the checkpoint could not be persisted.
    async fn after_stage(
        &self,
        _stage_name: &str,
        _status: StageStatus,
        _next_stage: Option<&str>,
        _context: &C,
    ) -> Result<()> {
        Ok(())
    }
}
