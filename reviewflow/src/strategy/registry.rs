//! Strategy selection by execution mode or workflow type.

use super::PipelineStrategy;
use crate::context::PipelineContext;
use crate::errors::{Result, ReviewflowError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Maps execution modes (e.g. `dry-run`, `heavy`) to strategies.
///
/// Composed once at process start and passed explicitly to the runner.
pub struct StrategyRegistry<C: PipelineContext> {
    strategies: BTreeMap<String, Arc<dyn PipelineStrategy<C>>>,
    default_mode: Option<String>,
}

impl<C: PipelineContext> StrategyRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
            default_mode: None,
        }
    }

    /// Registers a strategy under `mode`, replacing any previous one.
    #[must_use]
    pub fn with_strategy(
        mut self,
        mode: impl Into<String>,
        strategy: Arc<dyn PipelineStrategy<C>>,
    ) -> Self {
        self.register(mode, strategy);
        self
    }

    /// Sets the mode used when a lookup names no strategy.
    #[must_use]
    pub fn with_default_mode(mut self, mode: impl Into<String>) -> Self {
        self.default_mode = Some(mode.into());
        self
    }

    /// Registers a strategy under `mode`.
    pub fn register(&mut self, mode: impl Into<String>, strategy: Arc<dyn PipelineStrategy<C>>) {
        let mode = mode.into();
        debug!(mode = %mode, pipeline = strategy.pipeline_name(), "Registered strategy");
        self.strategies.insert(mode, strategy);
    }

    /// Returns the strategy for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::UnknownStrategy`] if nothing is registered.
    pub fn get(&self, mode: &str) -> Result<Arc<dyn PipelineStrategy<C>>> {
        self.strategies
            .get(mode)
            .cloned()
            .ok_or_else(|| ReviewflowError::UnknownStrategy(mode.to_string()))
    }

    /// Returns the strategy for `mode`, falling back to the default mode.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::UnknownStrategy`] if neither resolves.
    pub fn resolve(&self, mode: &str) -> Result<Arc<dyn PipelineStrategy<C>>> {
        if let Some(strategy) = self.strategies.get(mode) {
            return Ok(Arc::clone(strategy));
        }
        match &self.default_mode {
            Some(default) => self.get(default),
            None => Err(ReviewflowError::UnknownStrategy(mode.to_string())),
        }
    }

    /// Returns the registered modes in sorted order.
    #[must_use]
    pub fn modes(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}

impl<C: PipelineContext> Default for StrategyRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::PassThroughStage;
    use crate::strategy::StrategyBuilder;

    fn strategy(name: &str) -> Arc<dyn PipelineStrategy<String>> {
        Arc::new(
            StrategyBuilder::new(name)
                .stage(Arc::new(PassThroughStage::new("fetch")))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_registry_lookup() {
        let registry = StrategyRegistry::new()
            .with_strategy("dry-run", strategy("review-dry-run"))
            .with_strategy("heavy", strategy("review-heavy"));

        assert_eq!(registry.modes(), vec!["dry-run", "heavy"]);
        assert_eq!(registry.get("heavy").unwrap().pipeline_name(), "review-heavy");
        assert!(matches!(
            registry.get("light"),
            Err(ReviewflowError::UnknownStrategy(mode)) if mode == "light"
        ));
    }

    #[test]
    fn test_registry_default_mode() {
        let registry = StrategyRegistry::new()
            .with_strategy("heavy", strategy("review-heavy"))
            .with_default_mode("heavy");

        assert_eq!(registry.resolve("pr-review").unwrap().pipeline_name(), "review-heavy");

        let without_default = StrategyRegistry::new().with_strategy("heavy", strategy("review-heavy"));
        assert!(without_default.resolve("pr-review").is_err());
    }
}
