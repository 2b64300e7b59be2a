//! Job runner: drives workflow jobs through the executor.
//!
//! The runner owns no job state. Every decision is read from and written back
//! to the [`WorkflowJobRepository`], so a paused job holds no task between
//! pause and resume, and a second runner over the same store sees the same
//! jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{
    HandlerType, JobQueue, JobStatus, JobTransitionError, RetryPolicy, WorkflowJob,
    WorkflowJobRepository,
};
use crate::config::EngineConfig;
use crate::context::{from_state, to_state, PipelineContext};
use crate::errors::{ErrorClassification, Result, ReviewflowError};
use crate::executor::{
    ControlDecision, ExecutionOptions, ExecutionReport, ExecutionState, PipelineExecutor,
    RunControl, StageStatus,
};
use crate::reason::messages::{self, ErrorDetail};
use crate::stages::WaitRequest;
use crate::strategy::StrategyRegistry;

/// An external completion signal for a paused job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEvent {
    /// Event type, e.g. `ast.task.completed`.
    pub event_type: String,
    /// Event key, e.g. the external task id.
    pub event_key: String,
    /// Event body, recorded on the job.
    pub payload: Value,
    /// Delivery time, compared against the wait deadline.
    pub received_at: DateTime<Utc>,
}

impl ExternalEvent {
    /// Creates an event received now.
    #[must_use]
    pub fn new(event_type: impl Into<String>, event_key: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_key: event_key.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    /// Overrides the delivery time.
    #[must_use]
    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// What one runner call did to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobRunOutcome {
    /// Left on the queue for a worker.
    Queued,
    /// Reached `SUCCESS`, `PARTIAL_ERROR` or `SKIPPED`.
    Completed,
    /// Waiting for an external event.
    Paused,
    /// Failed retryably and was put back on the queue.
    Requeued,
    /// Reached `ERROR`.
    Failed,
    /// Stopped because the job was cancelled out-of-band.
    Cancelled,
    /// The awaited event arrived after the deadline.
    TimedOut,
}

impl fmt::Display for JobRunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Completed => write!(f, "completed"),
            Self::Paused => write!(f, "paused"),
            Self::Requeued => write!(f, "requeued"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A job snapshot after a runner call.
#[derive(Debug, Clone)]
pub struct JobRun {
    /// The persisted job.
    pub job: WorkflowJob,
    /// What happened.
    pub outcome: JobRunOutcome,
}

impl JobRun {
    fn new(job: WorkflowJob, outcome: JobRunOutcome) -> Self {
        Self { job, outcome }
    }
}

/// Checkpoints the job between stages and stops the run once the job has
/// been cancelled.
struct JobControl {
    jobs: Arc<dyn WorkflowJobRepository>,
    job_id: Uuid,
}

#[async_trait]
impl<C: PipelineContext> RunControl<C> for JobControl {
    async fn before_stage(&self, stage_name: &str) -> ControlDecision {
        match self.jobs.get(self.job_id).await {
            Ok(job) if job.status.is_terminal() => ControlDecision::Cancel(
                job.last_error
                    .unwrap_or_else(|| format!("Job is {}", job.status)),
            ),
            Ok(_) => ControlDecision::Continue,
            Err(err) => {
                warn!(job_id = %self.job_id, stage = %stage_name, error = %err, "Could not reload job before stage");
                ControlDecision::Continue
            }
        }
    }

    async fn after_stage(
        &self,
        stage_name: &str,
        status: StageStatus,
        next_stage: Option<&str>,
        context: &C,
    ) -> Result<()> {
        let mut job = self.jobs.get(self.job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }
        match status {
            StageStatus::Completed => job.record_progress(1, 0),
            StageStatus::Failed => job.record_progress(1, 1),
            StageStatus::Skipped | StageStatus::Paused => {}
        }
        job.checkpoint(next_stage.unwrap_or(stage_name), to_state(context)?)?;
        self.jobs.update(job).await?;
        Ok(())
    }
}

/// Worker that runs, pauses, resumes, retries and expires workflow jobs.
pub struct JobRunner<C: PipelineContext> {
    jobs: Arc<dyn WorkflowJobRepository>,
    queue: Arc<dyn JobQueue>,
    strategies: StrategyRegistry<C>,
    executor: PipelineExecutor<C>,
    config: EngineConfig,
    retry_policy: RetryPolicy,
}

impl<C: PipelineContext> JobRunner<C> {
    /// Creates a runner over a store that is both repository and queue.
    #[must_use]
    pub fn new<S>(store: Arc<S>, strategies: StrategyRegistry<C>, executor: PipelineExecutor<C>) -> Self
    where
        S: WorkflowJobRepository + JobQueue + 'static,
    {
        let jobs: Arc<dyn WorkflowJobRepository> = store.clone();
        let queue: Arc<dyn JobQueue> = store;
        let config = EngineConfig::default();
        Self {
            jobs,
            queue,
            strategies,
            executor,
            retry_policy: config.retry_policy(),
            config,
        }
    }

    /// Applies retry, timeout, sweep, failure-mode and default-strategy
    /// settings.
    ///
    /// The executor's critical stages are kept; only its failure mode is
    /// replaced.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        if let Some(mode) = &config.default_strategy_mode {
            self.strategies = std::mem::take(&mut self.strategies).with_default_mode(mode.clone());
        }
        let mut policy = config.failure_policy();
        policy
            .critical_stages
            .clone_from(&self.executor.failure_policy().critical_stages);
        self.executor = std::mem::take(&mut self.executor).with_failure_policy(policy);
        self.retry_policy = config.retry_policy();
        self.config = config;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the executor driving job runs.
    #[must_use]
    pub fn executor(&self) -> &PipelineExecutor<C> {
        &self.executor
    }

    /// Creates a job carrying the configured retry budget.
    #[must_use]
    pub fn new_job(&self, workflow_type: impl Into<String>, payload: Value) -> WorkflowJob {
        WorkflowJob::new(workflow_type, payload).with_max_retries(self.config.default_max_retries)
    }

    /// Submits a new job.
    ///
    /// `PIPELINE_SYNC` jobs are started and run before this returns;
    /// `QUEUED_TASK` jobs are only enqueued.
    ///
    /// # Errors
    ///
    /// Returns repository and state-machine errors.
    pub async fn submit(&self, mut job: WorkflowJob) -> Result<JobRun> {
        match job.handler_type {
            HandlerType::PipelineSync => {
                job.start(Utc::now())?;
                let job = self.jobs.create(job).await?;
                self.drive(job).await
            }
            HandlerType::QueuedTask => {
                let id = self.queue.enqueue(job).await?;
                debug!(job_id = %id, "Job queued");
                Ok(JobRun::new(self.jobs.get(id).await?, JobRunOutcome::Queued))
            }
        }
    }

    /// Runs a specific job: starts it if `PENDING`, continues it if it is
    /// `IN_PROGRESS` and not paused.
    ///
    /// # Errors
    ///
    /// Fails for paused or terminal jobs.
    pub async fn run_job(&self, id: Uuid) -> Result<JobRun> {
        let mut job = self.jobs.get(id).await?;
        match job.status {
            JobStatus::Pending => {
                job.start(Utc::now())?;
                job = self.jobs.update(job).await?;
            }
            JobStatus::InProgress if job.is_waiting() => {
                return Err(JobTransitionError::StillWaiting { job_id: id }.into());
            }
            JobStatus::InProgress => {}
            status => {
                return Err(JobTransitionError::Terminal {
                    job_id: id,
                    status,
                    action: "run",
                }
                .into());
            }
        }
        self.drive(job).await
    }

    /// Claims and runs the next runnable job, if any.
    ///
    /// # Errors
    ///
    /// Returns repository and state-machine errors.
    pub async fn run_next(&self, now: DateTime<Utc>) -> Result<Option<JobRun>> {
        match self.queue.claim_next(now).await? {
            Some(job) => Ok(Some(self.drive(job).await?)),
            None => Ok(None),
        }
    }

    /// Resumes every paused job waiting for this event.
    ///
    /// A job whose deadline passed before `received_at` is expired instead.
    /// A job that cannot be resumed is logged and left out of the result;
    /// the remaining jobs are still resumed.
    ///
    /// # Errors
    ///
    /// Fails only if the waiting jobs cannot be looked up.
    pub async fn deliver_event(&self, event: ExternalEvent) -> Result<Vec<JobRun>> {
        let waiting = self
            .jobs
            .find_waiting_for(&event.event_type, &event.event_key)
            .await?;
        if waiting.is_empty() {
            debug!(event_type = %event.event_type, event_key = %event.event_key, "No job waiting for event");
        }

        let mut runs = Vec::with_capacity(waiting.len());
        for job in waiting {
            let job_id = job.id;
            match self.resume_with(job, &event).await {
                Ok(run) => runs.push(run),
                Err(err) => {
                    error!(
                        job_id = %job_id,
                        event_type = %event.event_type,
                        event_key = %event.event_key,
                        error = %err,
                        "Could not resume job"
                    );
                }
            }
        }
        Ok(runs)
    }

    async fn resume_with(&self, mut job: WorkflowJob, event: &ExternalEvent) -> Result<JobRun> {
        match job.resume(&event.event_type, &event.event_key, event.received_at) {
            Ok(()) => {
                job.metadata.insert(
                    "resumedBy".to_string(),
                    json!({
                        "eventType": event.event_type,
                        "eventKey": event.event_key,
                        "receivedAt": event.received_at,
                        "payload": event.payload,
                    }),
                );
                let job = self.jobs.update(job).await?;
                self.drive(job).await
            }
            Err(JobTransitionError::WaitExpired { .. }) => {
                job.expire(event.received_at)?;
                let job = self.jobs.update(job).await?;
                Ok(JobRun::new(job, JobRunOutcome::TimedOut))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Expires paused jobs whose deadline is at or before `now`.
    ///
    /// Returns the ids of the expired jobs.
    ///
    /// # Errors
    ///
    /// Returns repository errors.
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut expired = Vec::new();
        for mut job in self.jobs.find_paused().await? {
            if job.expire(now)? {
                expired.push(job.id);
                self.jobs.update(job).await?;
            }
        }
        Ok(expired)
    }

    /// Runs [`sweep_timeouts`](Self::sweep_timeouts) every
    /// `sweep_interval_ms` until `shutdown` flips to true or its sender is
    /// dropped.
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.sweep_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.config.sweep_interval_ms, "Timeout sweeper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_timeouts(Utc::now()).await {
                        Ok(expired) if !expired.is_empty() => {
                            info!(count = expired.len(), "Expired paused jobs");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "Timeout sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Timeout sweeper stopped");
    }

    /// Spawns a task that delivers every event received on `events` until the
    /// channel closes.
    pub fn spawn_event_listener(self: &Arc<Self>, mut events: mpsc::Receiver<ExternalEvent>) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let event_type = event.event_type.clone();
                let event_key = event.event_key.clone();
                match runner.deliver_event(event).await {
                    Ok(runs) => {
                        debug!(event_type = %event_type, event_key = %event_key, resumed = runs.len(), "Event delivered");
                    }
                    Err(err) => {
                        error!(event_type = %event_type, event_key = %event_key, error = %err, "Event delivery failed");
                    }
                }
            }
            debug!("Event listener stopped");
        })
    }

    /// Cancels a non-terminal job. A running invocation stops before its
    /// next stage.
    ///
    /// # Errors
    ///
    /// Fails if the job does not exist or is already terminal.
    pub async fn cancel_job(&self, id: Uuid, reason: impl Into<String>) -> Result<WorkflowJob> {
        let mut job = self.jobs.get(id).await?;
        job.cancel(reason, Utc::now())?;
        self.jobs.update(job).await
    }

    async fn drive(&self, job: WorkflowJob) -> Result<JobRun> {
        let span = info_span!(
            "job",
            job_id = %job.id,
            correlation_id = %job.correlation_id,
            workflow_type = %job.workflow_type
        );
        self.drive_inner(job).instrument(span).await
    }

    async fn drive_inner(&self, job: WorkflowJob) -> Result<JobRun> {
        let strategy = match self.strategies.resolve(&job.workflow_type) {
            Ok(strategy) => strategy,
            Err(err) => {
                let message = messages::error("No pipeline for workflow type", Some(&ErrorDetail::from_error(&err)));
                return self.fail(job, ErrorClassification::Validation, message, false).await;
            }
        };

        let state = job.pipeline_state.as_ref().unwrap_or(&job.payload);
        let context: C = match from_state(state) {
            Ok(context) => context,
            Err(err) => {
                let message = messages::error("Invalid job payload", Some(&ErrorDetail::from_error(&err)));
                return self.fail(job, ErrorClassification::Validation, message, false).await;
            }
        };

        let control: Arc<dyn RunControl<C>> = Arc::new(JobControl {
            jobs: Arc::clone(&self.jobs),
            job_id: job.id,
        });
        let mut options = ExecutionOptions::new()
            .with_execution_id(job.correlation_id.clone())
            .with_control(control);
        if let Some(stage) = &job.current_stage {
            options = options.starting_at(stage.clone());
        }

        info!(
            pipeline = strategy.pipeline_name(),
            resume_at = job.current_stage.as_deref().unwrap_or("-"),
            retry_count = job.retry_count,
            "Running job"
        );
        let result = self
            .executor
            .execute_with(strategy.as_ref(), context, options)
            .await;

        let job = self.jobs.get(job.id).await?;
        if job.status.is_terminal() {
            info!(status = %job.status, "Job was cancelled during the run");
            return Ok(JobRun::new(job, JobRunOutcome::Cancelled));
        }

        match result {
            Ok(report) => self.apply_report(job, report).await,
            Err(ReviewflowError::PipelineAborted { stage, error, .. }) => {
                let message = messages::error(&format!("Stage '{stage}' failed"), Some(&ErrorDetail::from(&error)));
                let retryable = error.is_retryable();
                self.fail(job, error.classification, message, retryable).await
            }
            Err(ReviewflowError::Validation(err)) => {
                let message = messages::error("Invalid resume point", Some(&ErrorDetail::from_error(&err)));
                self.fail(job, ErrorClassification::Validation, message, false).await
            }
            Err(err) => {
                let message = messages::error("Pipeline failed", Some(&ErrorDetail::from_error(&err)));
                self.fail(job, ErrorClassification::Unknown, message, false).await
            }
        }
    }

    async fn apply_report(&self, mut job: WorkflowJob, report: ExecutionReport<C>) -> Result<JobRun> {
        match report.state {
            ExecutionState::Paused => {
                let (Some(stage), Some(wait)) = (report.paused_at.clone(), report.wait.clone()) else {
                    return Err(ReviewflowError::Internal("Paused run without a wait request".to_string()));
                };
                let wait = if wait.timeout.is_zero() {
                    WaitRequest {
                        timeout: self.config.default_event_timeout(),
                        ..wait
                    }
                } else {
                    wait
                };
                job.pause(stage, to_state(&report.context)?, &wait, Utc::now())?;
                let job = self.jobs.update(job).await?;
                Ok(JobRun::new(job, JobRunOutcome::Paused))
            }
            ExecutionState::Completed => {
                let status = if job.recoverable_failures() > 0 {
                    JobStatus::PartialError
                } else if job.acted_stages() == 0 {
                    JobStatus::Skipped
                } else {
                    JobStatus::Success
                };
                job.complete(status, Utc::now())?;
                let job = self.jobs.update(job).await?;
                Ok(JobRun::new(job, JobRunOutcome::Completed))
            }
            ExecutionState::Cancelled => Ok(JobRun::new(job, JobRunOutcome::Cancelled)),
            state => Err(ReviewflowError::Internal(format!("Run ended in unexpected state {state}"))),
        }
    }

    async fn fail(
        &self,
        mut job: WorkflowJob,
        classification: ErrorClassification,
        message: String,
        retryable: bool,
    ) -> Result<JobRun> {
        let disposition = job.fail(classification, message, retryable, &self.retry_policy, Utc::now())?;
        let job = self.jobs.update(job).await?;
        let outcome = match disposition {
            super::FailureDisposition::Requeued { .. } => JobRunOutcome::Requeued,
            super::FailureDisposition::Terminal => JobRunOutcome::Failed,
        };
        Ok(JobRun::new(job, outcome))
    }
}

impl<C: PipelineContext> fmt::Debug for JobRunner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("strategies", &self.strategies.modes())
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish()
    }
}
