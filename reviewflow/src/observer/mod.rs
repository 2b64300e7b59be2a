//! Pipeline observers.
//!
//! Observers are side-channel hooks invoked around every stage. They are
//! composed at startup into an [`ObserverChain`], which calls them in
//! insertion order and isolates each call: an observer that errors or panics
//! is logged and skipped, never allowed to change the run's outcome.

mod audit;
mod chain;
mod logging;

pub use audit::ExecutionLogObserver;
pub use chain::ObserverChain;
pub use logging::TracingObserver;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::PipelineContext;
use crate::errors::StageError;
use crate::stages::{StageVisibility, WaitRequest};

/// Per-call stage metadata handed to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverOptions {
    /// Visibility of the stage.
    pub visibility: Option<StageVisibility>,
    /// Display label of the stage.
    pub label: Option<String>,
    /// The execution the call belongs to.
    pub execution_id: Option<String>,
}

impl ObserverOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: StageVisibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// Failure reported by an observer hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ObserverError {
    /// What went wrong.
    pub message: String,
}

impl ObserverError {
    /// Creates a new observer error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<crate::errors::ReviewflowError> for ObserverError {
    fn from(err: crate::errors::ReviewflowError) -> Self {
        Self::new(err.to_string())
    }
}

/// Hook interface consumed by the executor.
///
/// Every hook defaults to a no-op so implementations only override what they
/// need. Hooks run on the critical path between stages; slow observers should
/// hand work off (e.g. to a channel) instead of blocking.
#[async_trait]
pub trait PipelineObserver<C: PipelineContext>: Send + Sync {
    /// Name used when logging isolated hook failures.
    fn name(&self) -> &str {
        "observer"
    }

    /// Called before a stage runs.
    async fn on_stage_start(
        &self,
        _stage_name: &str,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called after a stage completes with its new context.
    async fn on_stage_finish(
        &self,
        _stage_name: &str,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called when a stage fails, with the context it was given.
    async fn on_stage_error(
        &self,
        _stage_name: &str,
        _error: &StageError,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called when a stage skips, with the formatted reason.
    async fn on_stage_skipped(
        &self,
        _stage_name: &str,
        _reason: &str,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called when a stage pauses the run to wait for an external event.
    /// The same stage is started again on resume.
    async fn on_stage_paused(
        &self,
        _stage_name: &str,
        _wait: &WaitRequest,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        Ok(())
    }
}
