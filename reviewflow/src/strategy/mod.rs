//! Pipeline strategies.
//!
//! A strategy is pure configuration: a pipeline name and an ordered list of
//! shared stage instances. It holds no execution state, so one value can back
//! any number of concurrent executions.

mod builder;
mod registry;

pub use builder::StrategyBuilder;
pub use registry::StrategyRegistry;

use crate::context::PipelineContext;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::PipelineStage;
use std::fmt;
use std::sync::Arc;

/// Selects and orders the stages for one execution mode.
pub trait PipelineStrategy<C: PipelineContext>: Send + Sync {
    /// Returns the ordered stage list.
    fn configure_stages(&self) -> Vec<Arc<dyn PipelineStage<C>>>;

    /// Returns the pipeline name.
    fn pipeline_name(&self) -> &str;

    /// Returns the position of `stage_name`, if the strategy contains it.
    fn position_of(&self, stage_name: &str) -> Option<usize> {
        self.configure_stages()
            .iter()
            .position(|stage| stage.stage_name() == stage_name)
    }
}

/// A validated, immutable strategy produced by [`StrategyBuilder`].
pub struct StaticStrategy<C: PipelineContext> {
    name: String,
    stages: Vec<Arc<dyn PipelineStage<C>>>,
}

impl<C: PipelineContext> StaticStrategy<C> {
    pub(crate) fn new(name: String, stages: Vec<Arc<dyn PipelineStage<C>>>) -> Self {
        Self { name, stages }
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage_name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the strategy has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<C: PipelineContext> Clone for StaticStrategy<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            stages: self.stages.clone(),
        }
    }
}

impl<C: PipelineContext> fmt::Debug for StaticStrategy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticStrategy")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl<C: PipelineContext> PipelineStrategy<C> for StaticStrategy<C> {
    fn configure_stages(&self) -> Vec<Arc<dyn PipelineStage<C>>> {
        self.stages.clone()
    }

    fn pipeline_name(&self) -> &str {
        &self.name
    }
}

/// Resolves a resume pointer to a stage index.
///
/// # Errors
///
/// Returns `STRATEGY-UNKNOWN_STAGE` if the strategy has no stage named
/// `stage_name`.
pub fn resolve_start<C: PipelineContext>(
    pipeline: &str,
    stages: &[Arc<dyn PipelineStage<C>>],
    stage_name: &str,
) -> Result<usize, PipelineValidationError> {
    stages
        .iter()
        .position(|stage| stage.stage_name() == stage_name)
        .ok_or_else(|| {
            PipelineValidationError::new(format!(
                "Pipeline '{pipeline}' has no stage named '{stage_name}'"
            ))
            .with_stages(vec![stage_name.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "STRATEGY-UNKNOWN_STAGE",
                    format!("Resume pointer '{stage_name}' does not match any stage"),
                )
                .with_fix_hint("Migrate persisted currentStage values when renaming a stage.")
                .with_context_entry("pipeline", pipeline),
            )
        })
}
