//! Observer that reports stage transitions through `tracing`.

use async_trait::async_trait;
use tracing::{debug, info, warn, Level};

use super::{ObserverError, ObserverOptions, PipelineObserver};
use crate::context::PipelineContext;
use crate::errors::StageError;
use crate::stages::{StageVisibility, WaitRequest};

/// Logs every hook call with structured fields.
///
/// Secondary stages are logged at `DEBUG` regardless of the configured level.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    level: Level,
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl TracingObserver {
    /// Creates a tracing observer with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level observer.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level observer.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn emit(&self, event: &str, stage_name: &str, options: &ObserverOptions, detail: Option<&str>) {
        let label = options.label.as_deref().unwrap_or(stage_name);
        let execution_id = options.execution_id.as_deref().unwrap_or("-");
        let quiet = self.level == Level::DEBUG
            || options.visibility == Some(StageVisibility::Secondary);

        if quiet {
            debug!(
                event,
                stage = %stage_name,
                label = %label,
                execution_id = %execution_id,
                detail = detail.unwrap_or(""),
                "Stage {}", event
            );
        } else {
            info!(
                event,
                stage = %stage_name,
                label = %label,
                execution_id = %execution_id,
                detail = detail.unwrap_or(""),
                "Stage {}", event
            );
        }
    }
}

#[async_trait]
impl<C: PipelineContext> PipelineObserver<C> for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn on_stage_start(
        &self,
        stage_name: &str,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.emit("started", stage_name, options, None);
        Ok(())
    }

    async fn on_stage_finish(
        &self,
        stage_name: &str,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.emit("finished", stage_name, options, None);
        Ok(())
    }

    async fn on_stage_error(
        &self,
        stage_name: &str,
        error: &StageError,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        warn!(
            stage = %stage_name,
            execution_id = options.execution_id.as_deref().unwrap_or("-"),
            kind = %error.kind,
            classification = %error.classification,
            error = %error.to_canonical_string(),
            "Stage failed"
        );
        Ok(())
    }

    async fn on_stage_skipped(
        &self,
        stage_name: &str,
        reason: &str,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.emit("skipped", stage_name, options, Some(reason));
        Ok(())
    }

    async fn on_stage_paused(
        &self,
        stage_name: &str,
        wait: &WaitRequest,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        let waiting_for = format!("{} ({})", wait.event_type, wait.event_key);
        self.emit("paused", stage_name, options, Some(&waiting_for));
        Ok(())
    }
}
