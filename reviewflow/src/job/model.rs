//! Workflow job entity and its state machine.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::RetryPolicy;
use crate::errors::ErrorClassification;
use crate::stages::WaitRequest;

const ACTED_STAGES_KEY: &str = "actedStages";
const RECOVERABLE_FAILURES_KEY: &str = "recoverableFailures";

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Enqueued, not yet claimed.
    Pending,
    /// Claimed by a worker; possibly paused on an external event.
    InProgress,
    /// Every stage resolved without failure.
    Success,
    /// Fatal failure, exhausted retries, timeout or cancellation.
    Error,
    /// Completed with one or more recoverable stage failures.
    PartialError,
    /// Every stage skipped.
    Skipped,
}

impl JobStatus {
    /// Returns true for statuses that can never change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::PartialError | Self::Skipped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
            Self::PartialError => write!(f, "PARTIAL_ERROR"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// How the job is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerType {
    /// Run by the submitting caller as soon as it is enqueued.
    #[default]
    PipelineSync,
    /// Left on the queue for a worker to claim.
    QueuedTask,
}

/// The paused sub-state of an `IN_PROGRESS` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingForEvent {
    /// Event type to match.
    pub event_type: String,
    /// Event key to match.
    pub event_key: String,
    /// Timeout in milliseconds, counted from `paused_at`.
    pub timeout_ms: u64,
    /// When the job paused.
    pub paused_at: DateTime<Utc>,
}

impl WaitingForEvent {
    /// Returns the instant after which the wait has expired.
    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        ChronoDuration::from_std(std::time::Duration::from_millis(self.timeout_ms))
            .ok()
            .and_then(|timeout| self.paused_at.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns true once `now` has reached the deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Returns true if `(event_type, event_key)` is the awaited event.
    #[must_use]
    pub fn matches(&self, event_type: &str, event_key: &str) -> bool {
        self.event_type == event_type && self.event_key == event_key
    }
}

/// A rejected state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobTransitionError {
    /// The job already reached a terminal status.
    #[error("Job {job_id} is {status} and can no longer {action}")]
    Terminal {
        /// The job.
        job_id: Uuid,
        /// Its terminal status.
        status: JobStatus,
        /// The attempted action.
        action: &'static str,
    },
    /// The action is not valid from the job's current status.
    #[error("Job {job_id} cannot {action} while {status}")]
    InvalidState {
        /// The job.
        job_id: Uuid,
        /// Its current status.
        status: JobStatus,
        /// The attempted action.
        action: &'static str,
    },
    /// The job is not paused.
    #[error("Job {job_id} is not waiting for an event")]
    NotWaiting {
        /// The job.
        job_id: Uuid,
    },
    /// The job is paused, and cannot run until it is resumed.
    #[error("Job {job_id} is waiting for an event")]
    StillWaiting {
        /// The job.
        job_id: Uuid,
    },
    /// The delivered event is not the one the job waits for.
    #[error("Job {job_id} waits for {expected_type}/{expected_key}, got {event_type}/{event_key}")]
    EventMismatch {
        /// The job.
        job_id: Uuid,
        /// Awaited event type.
        expected_type: String,
        /// Awaited event key.
        expected_key: String,
        /// Delivered event type.
        event_type: String,
        /// Delivered event key.
        event_key: String,
    },
    /// The event arrived after the wait's deadline.
    #[error("Job {job_id} stopped waiting at {deadline}")]
    WaitExpired {
        /// The job.
        job_id: Uuid,
        /// When the wait expired.
        deadline: DateTime<Utc>,
    },
}

/// What happened to a job after a failed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Put back on the queue.
    Requeued {
        /// Retries used so far.
        retry_count: u32,
        /// When the job becomes claimable again.
        scheduled_at: DateTime<Utc>,
    },
    /// Terminal `ERROR`.
    Terminal,
}

/// Persisted, resumable description of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowJob {
    /// Job identifier.
    pub id: Uuid,
    /// Groups every log entry and event of one logical run, across retries.
    pub correlation_id: String,
    /// Selects the strategy.
    pub workflow_type: String,
    /// How the job is driven.
    pub handler_type: HandlerType,
    /// Input used to build the initial context.
    pub payload: Value,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Higher runs first.
    pub priority: i32,
    /// Retries used so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Category of the last failure.
    pub error_classification: Option<ErrorClassification>,
    /// User-safe message of the last failure.
    pub last_error: Option<String>,
    /// Earliest time the job may be claimed.
    pub scheduled_at: DateTime<Utc>,
    /// When the current attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Resume pointer.
    pub current_stage: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Set while paused.
    pub waiting_for_event: Option<WaitingForEvent>,
    /// Context snapshot to resume from `current_stage`.
    pub pipeline_state: Option<Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last persisted change.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowJob {
    /// Creates a `PENDING` job scheduled now.
    #[must_use]
    pub fn new(workflow_type: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4().to_string(),
            workflow_type: workflow_type.into(),
            handler_type: HandlerType::default(),
            payload,
            status: JobStatus::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
            error_classification: None,
            last_error: None,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            current_stage: None,
            metadata: Map::new(),
            waiting_for_event: None,
            pipeline_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Sets the handler type.
    #[must_use]
    pub fn with_handler_type(mut self, handler_type: HandlerType) -> Self {
        self.handler_type = handler_type;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the earliest claim time.
    #[must_use]
    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = scheduled_at;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true while paused.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.waiting_for_event.is_some()
    }

    /// Returns the number of stages that acted (did not skip) across invocations.
    #[must_use]
    pub fn acted_stages(&self) -> u64 {
        self.counter(ACTED_STAGES_KEY)
    }

    /// Returns the recoverable stage failures recorded across invocations.
    #[must_use]
    pub fn recoverable_failures(&self) -> u64 {
        self.counter(RECOVERABLE_FAILURES_KEY)
    }

    /// Adds one invocation's stage tallies to the running counters.
    pub fn record_progress(&mut self, acted: usize, recoverable_failures: usize) {
        self.bump(ACTED_STAGES_KEY, acted);
        self.bump(RECOVERABLE_FAILURES_KEY, recoverable_failures);
    }

    fn counter(&self, key: &str) -> u64 {
        self.metadata.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    fn bump(&mut self, key: &str, by: usize) {
        let next = self.counter(key).saturating_add(u64::try_from(by).unwrap_or(u64::MAX));
        self.metadata.insert(key.to_string(), Value::from(next));
    }

    fn ensure_not_terminal(&self, action: &'static str) -> Result<(), JobTransitionError> {
        if self.status.is_terminal() {
            return Err(JobTransitionError::Terminal {
                job_id: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    fn ensure_running(&self, action: &'static str) -> Result<(), JobTransitionError> {
        self.ensure_not_terminal(action)?;
        if self.status != JobStatus::InProgress {
            return Err(JobTransitionError::InvalidState {
                job_id: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    fn ensure_running_not_waiting(&self, action: &'static str) -> Result<(), JobTransitionError> {
        self.ensure_running(action)?;
        if self.is_waiting() {
            return Err(JobTransitionError::StillWaiting { job_id: self.id });
        }
        Ok(())
    }

    /// `PENDING → IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// Fails unless the job is `PENDING`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), JobTransitionError> {
        self.ensure_not_terminal("start")?;
        if self.status != JobStatus::Pending {
            return Err(JobTransitionError::InvalidState {
                job_id: self.id,
                status: self.status,
                action: "start",
            });
        }
        self.status = JobStatus::InProgress;
        self.started_at = Some(now);
        info!(job_id = %self.id, correlation_id = %self.correlation_id, "Job started");
        Ok(())
    }

    /// Records progress: the next stage to run and the context to run it on.
    ///
    /// # Errors
    ///
    /// Fails unless the job is running and not paused.
    pub fn checkpoint(
        &mut self,
        current_stage: impl Into<String>,
        pipeline_state: Value,
    ) -> Result<(), JobTransitionError> {
        self.ensure_running_not_waiting("checkpoint")?;
        self.current_stage = Some(current_stage.into());
        self.pipeline_state = Some(pipeline_state);
        Ok(())
    }

    /// `IN_PROGRESS → (paused)` at `stage`.
    ///
    /// # Errors
    ///
    /// Fails unless the job is running and not already paused.
    pub fn pause(
        &mut self,
        stage: impl Into<String>,
        pipeline_state: Value,
        wait: &WaitRequest,
        now: DateTime<Utc>,
    ) -> Result<(), JobTransitionError> {
        self.ensure_running_not_waiting("pause")?;
        let stage = stage.into();
        let waiting = WaitingForEvent {
            event_type: wait.event_type.clone(),
            event_key: wait.event_key.clone(),
            timeout_ms: u64::try_from(wait.timeout.as_millis()).unwrap_or(u64::MAX),
            paused_at: now,
        };
        info!(
            job_id = %self.id,
            stage = %stage,
            event_type = %waiting.event_type,
            event_key = %waiting.event_key,
            deadline = %waiting.deadline(),
            "Job paused"
        );
        self.current_stage = Some(stage);
        self.pipeline_state = Some(pipeline_state);
        self.waiting_for_event = Some(waiting);
        Ok(())
    }

    /// `(paused) → IN_PROGRESS` on a matching event before the deadline.
    ///
    /// # Errors
    ///
    /// Fails if the job is not paused, the event does not match, or the
    /// deadline has passed.
    pub fn resume(
        &mut self,
        event_type: &str,
        event_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), JobTransitionError> {
        self.ensure_running("resume")?;
        let waiting = self
            .waiting_for_event
            .as_ref()
            .ok_or(JobTransitionError::NotWaiting { job_id: self.id })?;

        if !waiting.matches(event_type, event_key) {
            return Err(JobTransitionError::EventMismatch {
                job_id: self.id,
                expected_type: waiting.event_type.clone(),
                expected_key: waiting.event_key.clone(),
                event_type: event_type.to_string(),
                event_key: event_key.to_string(),
            });
        }
        if waiting.is_expired(now) {
            return Err(JobTransitionError::WaitExpired {
                job_id: self.id,
                deadline: waiting.deadline(),
            });
        }

        info!(
            job_id = %self.id,
            stage = self.current_stage.as_deref().unwrap_or("-"),
            "Job resumed"
        );
        self.waiting_for_event = None;
        Ok(())
    }

    /// `(paused) → ERROR` with `TIMEOUT` once the deadline has passed.
    ///
    /// Returns false if the job is not paused or the deadline is still ahead.
    ///
    /// # Errors
    ///
    /// Fails if the job is terminal.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<bool, JobTransitionError> {
        self.ensure_not_terminal("expire")?;
        let Some(waiting) = &self.waiting_for_event else {
            return Ok(false);
        };
        if !waiting.is_expired(now) {
            return Ok(false);
        }

        let message = format!(
            "Timed out waiting for {} ({})",
            waiting.event_type, waiting.event_key
        );
        warn!(job_id = %self.id, message = %message, "Job timed out");
        self.waiting_for_event = None;
        self.finish(JobStatus::Error, now);
        self.error_classification = Some(ErrorClassification::Timeout);
        self.last_error = Some(message);
        Ok(true)
    }

    /// `IN_PROGRESS → SUCCESS | PARTIAL_ERROR | SKIPPED`.
    ///
    /// # Errors
    ///
    /// Fails if the job is not running, is paused, or `status` is not one of
    /// the three completion statuses.
    pub fn complete(&mut self, status: JobStatus, now: DateTime<Utc>) -> Result<(), JobTransitionError> {
        self.ensure_running_not_waiting("complete")?;
        if !matches!(status, JobStatus::Success | JobStatus::PartialError | JobStatus::Skipped) {
            return Err(JobTransitionError::InvalidState {
                job_id: self.id,
                status,
                action: "complete",
            });
        }
        info!(job_id = %self.id, status = %status, "Job completed");
        self.finish(status, now);
        Ok(())
    }

    /// Applies a failed run.
    ///
    /// A retryable failure with budget left re-enqueues the job (`PENDING`,
    /// same correlation id and pipeline state, later `scheduled_at`); anything
    /// else is terminal `ERROR`.
    ///
    /// # Errors
    ///
    /// Fails unless the job is `IN_PROGRESS`.
    pub fn fail(
        &mut self,
        classification: ErrorClassification,
        message: impl Into<String>,
        retryable: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureDisposition, JobTransitionError> {
        self.ensure_running("fail")?;
        self.error_classification = Some(classification);
        self.last_error = Some(message.into());
        self.waiting_for_event = None;

        if retryable && self.retry_count < self.max_retries {
            let delay = policy.delay_for(self.retry_count);
            self.retry_count += 1;
            self.scheduled_at = ChronoDuration::from_std(delay)
                .ok()
                .and_then(|delay| now.checked_add_signed(delay))
                .unwrap_or(now);
            self.status = JobStatus::Pending;
            self.started_at = None;
            warn!(
                job_id = %self.id,
                correlation_id = %self.correlation_id,
                retry_count = self.retry_count,
                max_retries = self.max_retries,
                scheduled_at = %self.scheduled_at,
                "Job re-enqueued after retryable failure"
            );
            return Ok(FailureDisposition::Requeued {
                retry_count: self.retry_count,
                scheduled_at: self.scheduled_at,
            });
        }

        warn!(
            job_id = %self.id,
            classification = %classification,
            retry_count = self.retry_count,
            "Job failed"
        );
        self.finish(JobStatus::Error, now);
        Ok(FailureDisposition::Terminal)
    }

    /// Marks a non-terminal job `ERROR` with `CANCELLED`, out-of-band.
    ///
    /// # Errors
    ///
    /// Fails if the job is already terminal.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), JobTransitionError> {
        self.ensure_not_terminal("cancel")?;
        let reason = reason.into();
        info!(job_id = %self.id, reason = %reason, "Job cancelled");
        self.waiting_for_event = None;
        self.finish(JobStatus::Error, now);
        self.error_classification = Some(ErrorClassification::Cancelled);
        self.last_error = Some(reason);
        Ok(())
    }

    fn finish(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JitterStrategy;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ms(n: i64) -> ChronoDuration {
        ChronoDuration::milliseconds(n)
    }

    fn running_job() -> WorkflowJob {
        let mut job = WorkflowJob::new("pr-review", serde_json::json!({"pr": 42}));
        job.start(t0()).unwrap();
        job
    }

    fn paused_job() -> WorkflowJob {
        let mut job = running_job();
        job.pause(
            "ast_analysis",
            serde_json::json!({"trail": ["fetch"]}),
            &WaitRequest::new("ast.task.completed", "task-123", Duration::from_millis(60_000)),
            t0(),
        )
        .unwrap();
        job
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::new().with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = WorkflowJob::new("pr-review", Value::Null);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.started_at.is_none());
        assert!(!job.is_waiting());
    }

    #[test]
    fn test_start_sets_started_at() {
        let job = running_job();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.started_at, Some(t0()));

        let mut again = job.clone();
        assert!(matches!(
            again.start(t0()),
            Err(JobTransitionError::InvalidState { action: "start", .. })
        ));
    }

    #[test]
    fn test_pause_records_wait() {
        let job = paused_job();
        let waiting = job.waiting_for_event.clone().unwrap();

        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.current_stage.as_deref(), Some("ast_analysis"));
        assert_eq!(waiting.event_type, "ast.task.completed");
        assert_eq!(waiting.event_key, "task-123");
        assert_eq!(waiting.timeout_ms, 60_000);
        assert_eq!(waiting.paused_at, t0());
        assert_eq!(waiting.deadline(), t0() + ms(60_000));
    }

    #[test]
    fn test_matching_event_before_deadline_resumes() {
        let mut job = paused_job();
        job.resume("ast.task.completed", "task-123", t0() + ms(10_000)).unwrap();

        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.waiting_for_event.is_none());
        assert_eq!(job.current_stage.as_deref(), Some("ast_analysis"));
        assert!(job.pipeline_state.is_some());
    }

    #[test]
    fn test_mismatched_or_late_event_is_rejected() {
        let mut job = paused_job();
        assert!(matches!(
            job.resume("ast.task.completed", "task-999", t0() + ms(10_000)),
            Err(JobTransitionError::EventMismatch { .. })
        ));
        assert!(matches!(
            job.resume("ast.task.completed", "task-123", t0() + ms(60_000)),
            Err(JobTransitionError::WaitExpired { .. })
        ));
        assert!(job.is_waiting());
    }

    #[test]
    fn test_timeout_moves_job_to_error() {
        let mut job = paused_job();
        assert!(!job.expire(t0() + ms(59_999)).unwrap());
        assert!(job.is_waiting());

        assert!(job.expire(t0() + ms(60_000)).unwrap());
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_classification, Some(ErrorClassification::Timeout));
        assert!(job.waiting_for_event.is_none());
        assert_eq!(job.completed_at, Some(t0() + ms(60_000)));
    }

    #[test]
    fn test_retry_then_terminal_error() {
        let mut job = running_job().with_max_retries(1);

        let first = job
            .fail(ErrorClassification::ExternalService, "rate limited", true, &no_jitter(), t0())
            .unwrap();
        assert_eq!(
            first,
            FailureDisposition::Requeued {
                retry_count: 1,
                scheduled_at: t0() + ms(1_000),
            }
        );
        assert_eq!(job.status, JobStatus::Pending);
        let correlation_id = job.correlation_id.clone();

        job.start(t0() + ms(1_000)).unwrap();
        let second = job
            .fail(ErrorClassification::ExternalService, "rate limited", true, &no_jitter(), t0() + ms(2_000))
            .unwrap();

        assert_eq!(second, FailureDisposition::Terminal);
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.correlation_id, correlation_id);
    }

    #[test]
    fn test_non_retryable_failure_is_terminal() {
        let mut job = running_job();
        let disposition = job
            .fail(ErrorClassification::Validation, "bad payload", false, &no_jitter(), t0())
            .unwrap();
        assert_eq!(disposition, FailureDisposition::Terminal);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.last_error.as_deref(), Some("bad payload"));
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut job = running_job();
        job.complete(JobStatus::Success, t0()).unwrap();
        let snapshot = job.clone();

        assert!(matches!(job.start(t0()), Err(JobTransitionError::Terminal { .. })));
        assert!(matches!(job.cancel("stop", t0()), Err(JobTransitionError::Terminal { .. })));
        assert!(matches!(job.expire(t0()), Err(JobTransitionError::Terminal { .. })));
        assert!(job.complete(JobStatus::PartialError, t0()).is_err());
        assert!(job
            .fail(ErrorClassification::Unknown, "late", true, &no_jitter(), t0())
            .is_err());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_complete_rejects_non_completion_status() {
        let mut job = running_job();
        assert!(job.complete(JobStatus::Error, t0()).is_err());
        assert!(paused_job().complete(JobStatus::Success, t0()).is_err());
    }

    #[test]
    fn test_cancel_paused_job() {
        let mut job = paused_job();
        job.cancel("closed by operator", t0()).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_classification, Some(ErrorClassification::Cancelled));
        assert!(!job.is_waiting());
    }

    #[test]
    fn test_progress_counters() {
        let mut job = running_job();
        job.record_progress(2, 1);
        job.record_progress(1, 0);
        assert_eq!(job.acted_stages(), 3);
        assert_eq!(job.recoverable_failures(), 1);
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let json = serde_json::to_value(paused_job()).unwrap();
        assert_eq!(json["status"], "IN_PROGRESS");
        assert_eq!(json["handlerType"], "PIPELINE_SYNC");
        assert_eq!(json["waitingForEvent"]["eventKey"], "task-123");
        assert_eq!(json["currentStage"], "ast_analysis");
    }
}
