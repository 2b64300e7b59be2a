//! Test fixtures for pipeline testing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::PipelineValidationError;
use crate::stages::PipelineStage;
use crate::strategy::{StaticStrategy, StrategyBuilder};

/// A context that records which stages produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Stage names in the order they completed.
    pub trail: Vec<String>,
    /// Arbitrary values written by stages.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl TraceContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Returns the trail as string slices.
    #[must_use]
    pub fn trail(&self) -> Vec<&str> {
        self.trail.iter().map(String::as_str).collect()
    }
}

/// Builds a strategy from stages in order.
///
/// # Errors
///
/// Returns the builder's validation error.
pub fn strategy_of(
    name: &str,
    stages: Vec<Arc<dyn PipelineStage<TraceContext>>>,
) -> Result<StaticStrategy<TraceContext>, PipelineValidationError> {
    StrategyBuilder::new(name).stages(stages).build()
}
