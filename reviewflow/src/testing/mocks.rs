//! Scripted stages and observers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::TraceContext;
use crate::context::{update, PipelineContext};
use crate::errors::StageError;
use crate::observer::{ObserverError, ObserverOptions, PipelineObserver};
use crate::reason::PipelineReason;
use crate::stages::{PipelineStage, StageOutcome, StageVisibility, WaitRequest};

/// A stage that appends its name to the trail and records its inputs.
#[derive(Debug)]
pub struct AppendStage {
    name: String,
    label: Option<String>,
    visibility: StageVisibility,
    inputs: Mutex<Vec<TraceContext>>,
}

impl AppendStage {
    /// Creates a new append stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            visibility: StageVisibility::Primary,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Sets the label.
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

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns every context the stage received.
    #[must_use]
    pub fn inputs(&self) -> Vec<TraceContext> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl PipelineStage<TraceContext> for AppendStage {
    fn stage_name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn visibility(&self) -> StageVisibility {
        self.visibility
    }

    async fn execute_stage(
        &self,
        context: &TraceContext,
    ) -> Result<StageOutcome<TraceContext>, StageError> {
        self.inputs.lock().push(context.clone());
        Ok(StageOutcome::Completed(update(context, |c| {
            c.trail.push(self.name.clone());
        })))
    }
}

/// A stage that always skips.
#[derive(Debug)]
pub struct SkippingStage {
    name: String,
    reason: PipelineReason,
    technical: Option<String>,
}

impl SkippingStage {
    /// Creates a new skipping stage.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: PipelineReason) -> Self {
        Self {
            name: name.into(),
            reason,
            technical: None,
        }
    }

    /// Sets the technical suffix.
    #[must_use]
    pub fn with_technical(mut self, technical: impl Into<String>) -> Self {
        self.technical = Some(technical.into());
        self
    }
}

#[async_trait]
impl PipelineStage<TraceContext> for SkippingStage {
    fn stage_name(&self) -> &str {
        &self.name
    }

    async fn execute_stage(
        &self,
        _context: &TraceContext,
    ) -> Result<StageOutcome<TraceContext>, StageError> {
        Ok(match &self.technical {
            Some(technical) => StageOutcome::skipped_with_technical(self.reason.clone(), technical),
            None => StageOutcome::skipped(self.reason.clone()),
        })
    }
}

/// A stage that always fails with a fixed error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: StageError,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: StageError) -> Self {
        Self {
            name: name.into(),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineStage<TraceContext> for FailingStage {
    fn stage_name(&self) -> &str {
        &self.name
    }

    async fn execute_stage(
        &self,
        _context: &TraceContext,
    ) -> Result<StageOutcome<TraceContext>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A stage that pauses on its first `pauses` calls, then completes.
///
/// When pausing it writes `"<name>.task" = event_key` to the context, the way
/// a real stage records the external task it started.
#[derive(Debug)]
pub struct PausingStage {
    name: String,
    wait: WaitRequest,
    pauses: usize,
    calls: AtomicUsize,
}

impl PausingStage {
    /// Creates a stage that pauses once.
    #[must_use]
    pub fn new(name: impl Into<String>, wait: WaitRequest) -> Self {
        Self {
            name: name.into(),
            wait,
            pauses: 1,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sets how many calls pause before the stage completes.
    #[must_use]
    pub fn with_pauses(mut self, pauses: usize) -> Self {
        self.pauses = pauses;
        self
    }

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineStage<TraceContext> for PausingStage {
    fn stage_name(&self) -> &str {
        &self.name
    }

    async fn execute_stage(
        &self,
        context: &TraceContext,
    ) -> Result<StageOutcome<TraceContext>, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.pauses {
            let next = update(context, |c| {
                c.values.insert(
                    format!("{}.task", self.name),
                    Value::from(self.wait.event_key.clone()),
                );
            });
            return Ok(StageOutcome::paused(next, self.wait.clone()));
        }
        Ok(StageOutcome::Completed(update(context, |c| {
            c.trail.push(self.name.clone());
        })))
    }
}

/// An observer that records every hook call.
///
/// Calls are recorded as `start:<stage>`, `finish:<stage>`,
/// `error:<stage>:<message>`, `skipped:<stage>:<reason>` and
/// `paused:<stage>:<event_key>`.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<String>>,
    contexts: Mutex<Vec<(String, Value)>>,
    options: Mutex<Vec<ObserverOptions>>,
}

impl RecordingObserver {
    /// Creates a new recording observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the serialized context passed to each call.
    #[must_use]
    pub fn contexts(&self) -> Vec<(String, Value)> {
        self.contexts.lock().clone()
    }

    /// Returns the options passed to each call.
    #[must_use]
    pub fn options(&self) -> Vec<ObserverOptions> {
        self.options.lock().clone()
    }

    fn record<C: PipelineContext>(&self, call: String, context: &C, options: &ObserverOptions) {
        let snapshot = serde_json::to_value(context).unwrap_or(Value::Null);
        self.contexts.lock().push((call.clone(), snapshot));
        self.options.lock().push(options.clone());
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl<C: PipelineContext> PipelineObserver<C> for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_stage_start(
        &self,
        stage_name: &str,
        context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.record(format!("start:{stage_name}"), context, options);
        Ok(())
    }

    async fn on_stage_finish(
        &self,
        stage_name: &str,
        context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.record(format!("finish:{stage_name}"), context, options);
        Ok(())
    }

    async fn on_stage_error(
        &self,
        stage_name: &str,
        error: &StageError,
        context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.record(format!("error:{stage_name}:{}", error.message), context, options);
        Ok(())
    }

    async fn on_stage_skipped(
        &self,
        stage_name: &str,
        reason: &str,
        context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.record(format!("skipped:{stage_name}:{reason}"), context, options);
        Ok(())
    }

    async fn on_stage_paused(
        &self,
        stage_name: &str,
        wait: &WaitRequest,
        context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.record(format!("paused:{stage_name}:{}", wait.event_key), context, options);
        Ok(())
    }
}

/// An observer whose every hook panics.
#[derive(Debug, Default)]
pub struct PanickingObserver;

impl PanickingObserver {
    /// Creates a new panicking observer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<C: PipelineContext> PipelineObserver<C> for PanickingObserver {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn on_stage_start(
        &self,
        stage_name: &str,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        panic!("observer exploded on start of {stage_name}")
    }

    async fn on_stage_finish(
        &self,
        stage_name: &str,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        panic!("observer exploded on finish of {stage_name}")
    }

    async fn on_stage_error(
        &self,
        stage_name: &str,
        _error: &StageError,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        panic!("observer exploded on error of {stage_name}")
    }

    async fn on_stage_skipped(
        &self,
        stage_name: &str,
        _reason: &str,
        _context: &C,
        _options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        panic!("observer exploded on skip of {stage_name}")
    }
}
