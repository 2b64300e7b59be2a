//! Strategy builder with validation.

use super::StaticStrategy;
use crate::context::PipelineContext;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::PipelineStage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated strategies.
pub struct StrategyBuilder<C: PipelineContext> {
    name: String,
    stages: Vec<Arc<dyn PipelineStage<C>>>,
}

impl<C: PipelineContext> StrategyBuilder<C> {
    /// Creates a new strategy builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn PipelineStage<C>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends several stages in order.
    #[must_use]
    pub fn stages<I>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PipelineStage<C>>>,
    {
        self.stages.extend(stages);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, there are no stages, or a stage
    /// name is blank or repeated.
    pub fn build(self) -> Result<StaticStrategy<C>, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name cannot be blank")
                .with_error_info(
                    ContractErrorInfo::new("STRATEGY-BLANK_NAME", "Pipeline name is blank")
                        .with_fix_hint("Give the strategy a stable, non-empty pipeline name."),
                ));
        }

        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            ))
            .with_error_info(
                ContractErrorInfo::new("STRATEGY-EMPTY", "Cannot build an empty strategy")
                    .with_fix_hint("Add at least one stage before building."),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            let stage_name = stage.stage_name();
            if stage_name.trim().is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Pipeline '{}' contains a stage with a blank name",
                    self.name
                ))
                .with_error_info(
                    ContractErrorInfo::new("STRATEGY-BLANK_NAME", "Stage name is blank")
                        .with_fix_hint("Stage names are persisted identities and must be non-empty."),
                ));
            }
            if !seen.insert(stage_name) {
                return Err(PipelineValidationError::new(format!(
                    "Pipeline '{}' contains stage '{}' more than once",
                    self.name, stage_name
                ))
                .with_stages(vec![stage_name.to_string()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "STRATEGY-DUPLICATE_STAGE",
                        format!("Stage '{stage_name}' appears twice"),
                    )
                    .with_fix_hint("Resume pointers need unique stage names within a strategy."),
                ));
            }
        }

        Ok(StaticStrategy::new(self.name, self.stages))
    }
}
