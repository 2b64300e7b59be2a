//! Sequential pipeline executor.
//!
//! Runs a strategy's stages strictly in order over a context. Each stage's
//! output context is the next stage's only input. Observers are notified
//! around every stage; their failures are isolated by the [`ObserverChain`].
//!
//! A fatal failure aborts the remaining stages and is returned as
//! [`ReviewflowError::PipelineAborted`]. Completed, paused and cancelled runs
//! are returned as an [`ExecutionReport`].

mod control;
mod policy;
mod report;


pub use control::{ControlDecision, RunControl};
pub use policy::{FailureMode, FailurePolicy, FailureRecord};
pub use report::{ExecutionReport, ExecutionState, StageRecord, StageStatus};

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::context::PipelineContext;
use crate::errors::{Result, ReviewflowError};
use crate::observability::SpanTimer;
use crate::observer::{ObserverChain, ObserverOptions, PipelineObserver};
use crate::reason::messages;
use crate::stages::{PipelineStage, StageOutcome};
use crate::strategy::{resolve_start, PipelineStrategy};

/// Per-invocation options.
pub struct ExecutionOptions<C: PipelineContext> {
    /// Stage to start at instead of the first one.
    pub start_at: Option<String>,
    /// Execution id handed to observers (usually the job's correlation id).
    pub execution_id: Option<String>,
    /// Between-stage control hook.
    pub control: Option<Arc<dyn RunControl<C>>>,
}

impl<C: PipelineContext> ExecutionOptions<C> {
    /// Creates default options: start at the first stage, no control hook.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_at: None,
            execution_id: None,
            control: None,
        }
    }

    /// Resumes at `stage_name`.
    #[must_use]
    pub fn starting_at(mut self, stage_name: impl Into<String>) -> Self {
        self.start_at = Some(stage_name.into());
        self
    }

    /// Sets the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Sets the control hook.
    #[must_use]
    pub fn with_control(mut self, control: Arc<dyn RunControl<C>>) -> Self {
        self.control = Some(control);
        self
    }
}

impl<C: PipelineContext> Default for ExecutionOptions<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> fmt::Debug for ExecutionOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("start_at", &self.start_at)
            .field("execution_id", &self.execution_id)
            .field("control", &self.control.is_some())
            .finish()
    }
}

/// Runs strategies over contexts.
///
/// Holds no per-run state; one executor can drive many concurrent runs.
pub struct PipelineExecutor<C: PipelineContext> {
    observers: ObserverChain<C>,
    policy: FailurePolicy,
}

impl<C: PipelineContext> PipelineExecutor<C> {
    /// Creates an executor with no observers and the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: ObserverChain::new(),
            policy: FailurePolicy::default(),
        }
    }

    /// Appends an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver<C>>) -> Self {
        self.observers.add(observer);
        self
    }

    /// Replaces the observer chain.
    #[must_use]
    pub fn with_observers(mut self, observers: ObserverChain<C>) -> Self {
        self.observers = observers;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> &FailurePolicy {
        &self.policy
    }

    /// Returns the observer chain.
    #[must_use]
    pub fn observers(&self) -> &ObserverChain<C> {
        &self.observers
    }

    /// Runs every stage of `strategy` from the first one.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::PipelineAborted`] on a fatal stage failure.
    pub async fn execute(
        &self,
        strategy: &dyn PipelineStrategy<C>,
        context: C,
    ) -> Result<ExecutionReport<C>> {
        self.execute_with(strategy, context, ExecutionOptions::new()).await
    }

    /// Runs `strategy` with explicit options.
    ///
    /// # Errors
    ///
    /// - [`ReviewflowError::Validation`] if `start_at` names no stage.
    /// - [`ReviewflowError::PipelineAborted`] on a fatal stage failure.
    /// - Any error returned by [`RunControl::after_stage`].
    pub async fn execute_with(
        &self,
        strategy: &dyn PipelineStrategy<C>,
        context: C,
        options: ExecutionOptions<C>,
    ) -> Result<ExecutionReport<C>> {
        let pipeline = strategy.pipeline_name().to_string();
        let stages = strategy.configure_stages();
        let start = match &options.start_at {
            Some(stage_name) => resolve_start(&pipeline, &stages, stage_name)?,
            None => 0,
        };

        let mut report = ExecutionReport::new(pipeline.clone(), context);
        report.started_at_stage = stages.get(start).map(|s| s.stage_name().to_string());
        transition(&mut report, ExecutionState::Running);
        info!(
            pipeline = %pipeline,
            stages = stages.len(),
            start_at = report.started_at_stage.as_deref().unwrap_or("-"),
            execution_id = options.execution_id.as_deref().unwrap_or("-"),
            "Pipeline started"
        );

        for (index, stage) in stages.iter().enumerate().skip(start) {
            let stage_name = stage.stage_name();

            if let Some(control) = &options.control {
                if let ControlDecision::Cancel(reason) = control.before_stage(stage_name).await {
                    info!(pipeline = %pipeline, stage = %stage_name, reason = %reason, "Pipeline cancelled");
                    report.cancelled_before = Some(stage_name.to_string());
                    report.cancel_reason = Some(reason);
                    transition(&mut report, ExecutionState::Cancelled);
                    return Ok(report);
                }
            }

            let hook_options = observer_options(stage.as_ref(), options.execution_id.as_deref());
            self.observers
                .notify_start(stage_name, &report.context, &hook_options)
                .await;

            let timer = SpanTimer::start(&pipeline, stage_name);
            let result = stage
                .execute_stage(&report.context)
                .instrument(timer.span())
                .await;
            let duration_ms = timer.finish();

            let status = match result {
                Ok(StageOutcome::Completed(next)) => {
                    report.context = next;
                    self.observers
                        .notify_finish(stage_name, &report.context, &hook_options)
                        .await;
                    push_record(&mut report, stage_name, StageStatus::Completed, duration_ms, None);
                    StageStatus::Completed
                }
                Ok(StageOutcome::Skipped { reason, technical }) => {
                    let formatted = messages::skipped_with_reason(&reason, technical.as_deref());
                    debug!(pipeline = %pipeline, stage = %stage_name, reason = %formatted, "Stage skipped");
                    self.observers
                        .notify_skipped(stage_name, &formatted, &report.context, &hook_options)
                        .await;
                    push_record(&mut report, stage_name, StageStatus::Skipped, duration_ms, Some(formatted));
                    StageStatus::Skipped
                }
                Ok(StageOutcome::Paused { context, wait }) => {
                    info!(
                        pipeline = %pipeline,
                        stage = %stage_name,
                        event_type = %wait.event_type,
                        event_key = %wait.event_key,
                        timeout_ms = u64::try_from(wait.timeout.as_millis()).unwrap_or(u64::MAX),
                        "Pipeline paused"
                    );
                    report.context = context;
                    self.observers
                        .notify_paused(stage_name, &wait, &report.context, &hook_options)
                        .await;
                    report.paused_at = Some(stage_name.to_string());
                    report.wait = Some(wait);
                    push_record(&mut report, stage_name, StageStatus::Paused, duration_ms, None);
                    transition(&mut report, ExecutionState::Paused);
                    return Ok(report);
                }
                Err(stage_error) => {
                    self.observers
                        .notify_error(stage_name, &stage_error, &report.context, &hook_options)
                        .await;
                    let fatal = self.policy.is_fatal(stage_name, &stage_error);
                    push_record(
                        &mut report,
                        stage_name,
                        StageStatus::Failed,
                        duration_ms,
                        Some(stage_error.message.clone()),
                    );

                    if fatal {
                        error!(
                            pipeline = %pipeline,
                            stage = %stage_name,
                            error = %stage_error.to_canonical_string(),
                            "Fatal stage failure"
                        );
                        transition(&mut report, ExecutionState::Aborted);
                        return Err(ReviewflowError::PipelineAborted {
                            pipeline,
                            stage: stage_name.to_string(),
                            error: stage_error,
                        });
                    }

                    warn!(
                        pipeline = %pipeline,
                        stage = %stage_name,
                        error = %stage_error.to_canonical_string(),
                        "Recoverable stage failure, continuing with last good context"
                    );
                    report
                        .failures
                        .push(FailureRecord::new(stage_name, stage_error, false));
                    StageStatus::Failed
                }
            };

            if let Some(control) = &options.control {
                let next_stage = stages.get(index + 1).map(|s| s.stage_name());
                control
                    .after_stage(stage_name, status, next_stage, &report.context)
                    .await?;
            }
        }

        transition(&mut report, ExecutionState::Completed);
        info!(
            pipeline = %pipeline,
            partial = report.is_partial(),
            duration_ms = report.total_duration_ms(),
            "Pipeline completed"
        );
        Ok(report)
    }
}

impl<C: PipelineContext> Default for PipelineExecutor<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> fmt::Debug for PipelineExecutor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("observers", &self.observers)
            .field("policy", &self.policy)
            .finish()
    }
}

fn observer_options<C: PipelineContext>(
    stage: &dyn PipelineStage<C>,
    execution_id: Option<&str>,
) -> ObserverOptions {
    ObserverOptions {
        visibility: Some(stage.visibility()),
        label: stage.label().map(str::to_string),
        execution_id: execution_id.map(str::to_string),
    }
}

fn transition<C>(report: &mut ExecutionReport<C>, next: ExecutionState) {
    debug!(
        pipeline = %report.pipeline,
        from = %report.state,
        to = %next,
        "Execution state changed"
    );
    report.state = next;
}

fn push_record<C>(
    report: &mut ExecutionReport<C>,
    stage_name: &str,
    status: StageStatus,
    duration_ms: f64,
    message: Option<String>,
) {
    report.stages.push(StageRecord {
        stage_name: stage_name.to_string(),
        status,
        duration_ms,
        message,
    });
}
