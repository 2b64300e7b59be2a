//! Stage trait and implementations.
//!
//! A stage is one named, ordered unit of pipeline work. It receives the
//! current context by reference and returns a [`StageOutcome`] carrying the
//! derived context, or a [`StageError`].

mod outcome;

pub use outcome::{StageOutcome, WaitRequest};

use crate::context::PipelineContext;
use crate::errors::StageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Whether a stage is surfaced prominently in status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageVisibility {
    /// Shown to users.
    #[default]
    Primary,
    /// Internal bookkeeping.
    Secondary,
}

impl fmt::Display for StageVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "PRIMARY"),
            Self::Secondary => write!(f, "SECONDARY"),
        }
    }
}

/// Trait for pipeline stages.
///
/// `stage_name` is the persisted identity used by execution logs and resume
/// pointers; it must stay stable across releases. Implementations are shared
/// between strategies and concurrent runs, so they must be stateless or
/// safely reentrant, and idempotent for a given input context.
#[async_trait]
pub trait PipelineStage<C: PipelineContext>: Send + Sync {
    /// Returns the stable stage name.
    fn stage_name(&self) -> &str;

    /// Returns the display label.
    fn label(&self) -> Option<&str> {
        None
    }

    /// Returns the stage visibility.
    fn visibility(&self) -> StageVisibility {
        StageVisibility::Primary
    }

    /// Executes the stage against `context`.
    async fn execute_stage(&self, context: &C) -> Result<StageOutcome<C>, StageError>;
}

/// A simple function-based stage.
pub struct FnStage<C, F>
where
    F: Fn(&C) -> Result<StageOutcome<C>, StageError> + Send + Sync,
{
    name: String,
    label: Option<String>,
    visibility: StageVisibility,
    func: F,
    _context: PhantomData<fn() -> C>,
}

impl<C, F> FnStage<C, F>
where
    F: Fn(&C) -> Result<StageOutcome<C>, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            label: None,
            visibility: StageVisibility::Primary,
            func,
            _context: PhantomData,
        }
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: StageVisibility) -> Self {
        self.visibility = visibility;
        self
    }
}

impl<C, F> fmt::Debug for FnStage<C, F>
where
    F: Fn(&C) -> Result<StageOutcome<C>, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .finish()
    }
}

#[async_trait]
impl<C, F> PipelineStage<C> for FnStage<C, F>
where
    C: PipelineContext,
    F: Fn(&C) -> Result<StageOutcome<C>, StageError> + Send + Sync,
{
    fn stage_name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn visibility(&self) -> StageVisibility {
        self.visibility
    }

    async fn execute_stage(&self, context: &C) -> Result<StageOutcome<C>, StageError> {
        (self.func)(context)
    }
}

/// A stage that passes a fresh copy of its input through.
#[derive(Debug, Clone)]
pub struct PassThroughStage {
    name: String,
}

impl PassThroughStage {
    /// Creates a new pass-through stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<C: PipelineContext> PipelineStage<C> for PassThroughStage {
    fn stage_name(&self) -> &str {
        &self.name
    }

    fn visibility(&self) -> StageVisibility {
        StageVisibility::Secondary
    }

    async fn execute_stage(&self, context: &C) -> Result<StageOutcome<C>, StageError> {
        Ok(StageOutcome::Completed(context.clone()))
    }
}
