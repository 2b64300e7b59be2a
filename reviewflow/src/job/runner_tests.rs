use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::*;
use crate::config::EngineConfig;
use crate::context::{from_state, update};
use crate::errors::{ErrorClassification, ReviewflowError, StageError};
use crate::execution_log::{
    ExecutionLogRepository, InMemoryExecutionLogRepository, InProgressPolicy, LogFilter, LogStatus,
};
use crate::executor::{FailureMode, FailurePolicy, PipelineExecutor};
use crate::observer::ExecutionLogObserver;
use crate::reason::PipelineReason;
use crate::stages::{PipelineStage, StageOutcome, WaitRequest};
use crate::strategy::StrategyRegistry;
use crate::testing::{strategy_of, AppendStage, FailingStage, PausingStage, SkippingStage, TraceContext};

const WORKFLOW: &str = "pr-review";

fn config() -> EngineConfig {
    EngineConfig::new().with_retry_jitter(JitterStrategy::None)
}

fn runner_with(
    stages: Vec<Arc<dyn PipelineStage<TraceContext>>>,
) -> (JobRunner<TraceContext>, Arc<InMemoryJobStore>) {
    let strategy = Arc::new(strategy_of("review", stages).unwrap());
    let registry = StrategyRegistry::<TraceContext>::new().with_strategy(WORKFLOW, strategy);
    let store = Arc::new(InMemoryJobStore::new());
    let runner = JobRunner::new(Arc::clone(&store), registry, PipelineExecutor::<TraceContext>::new()).with_config(config());
    (runner, store)
}

fn payload() -> Value {
    json!({ "trail": [] })
}

fn ast_wait() -> WaitRequest {
    WaitRequest::new("ast.task.completed", "task-123", Duration::from_millis(60_000))
}

fn trail_of(job: &WorkflowJob) -> Vec<String> {
    let state = job.pipeline_state.as_ref().unwrap();
    from_state::<TraceContext>(state).unwrap().trail
}

/// Cancels every running job through the store, as an operator would.
struct CancellingStage {
    store: Arc<InMemoryJobStore>,
}

#[async_trait]
impl PipelineStage<TraceContext> for CancellingStage {
    fn stage_name(&self) -> &str {
        "cancel"
    }

    async fn execute_stage(&self, context: &TraceContext) -> Result<StageOutcome<TraceContext>, StageError> {
        for id in self.store.ids_with_status(JobStatus::InProgress) {
            let mut job = self.store.get(id).await.unwrap();
            job.cancel("closed by operator", Utc::now()).unwrap();
            self.store.update(job).await.unwrap();
        }
        Ok(StageOutcome::completed(update(context, |c| c.trail.push("cancel".to_string()))))
    }
}

#[tokio::test]
async fn test_sync_job_runs_to_success() {
    let (runner, _) = runner_with(vec![Arc::new(AppendStage::new("A")), Arc::new(AppendStage::new("B"))]);

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.outcome, JobRunOutcome::Completed);
    assert_eq!(run.job.status, JobStatus::Success);
    assert_eq!(run.job.current_stage.as_deref(), Some("B"));
    assert_eq!(trail_of(&run.job), vec!["A", "B"]);
    assert!(run.job.completed_at.is_some());
    assert_eq!(run.job.acted_stages(), 2);
}

#[tokio::test]
async fn test_pause_then_matching_event_resumes_and_completes() {
    let first = Arc::new(AppendStage::new("A"));
    let pausing = Arc::new(PausingStage::new("P", ast_wait()));
    let last = Arc::new(AppendStage::new("C"));
    let (runner, store) = runner_with(vec![first.clone(), pausing.clone(), last.clone()]);

    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    assert_eq!(paused.outcome, JobRunOutcome::Paused);
    assert_eq!(paused.job.status, JobStatus::InProgress);
    assert_eq!(paused.job.current_stage.as_deref(), Some("P"));
    let waiting = paused.job.waiting_for_event.clone().unwrap();
    assert_eq!(waiting.event_type, "ast.task.completed");
    assert_eq!(waiting.event_key, "task-123");
    assert_eq!(waiting.timeout_ms, 60_000);
    assert_eq!(trail_of(&paused.job), vec!["A"]);
    assert_eq!(last.call_count(), 0);

    let event = ExternalEvent::new("ast.task.completed", "task-123", json!({"findings": 3}))
        .at(waiting.paused_at + ChronoDuration::milliseconds(10_000));
    let runs = runner.deliver_event(event).await.unwrap();

    assert_eq!(runs.len(), 1);
    let resumed = &runs[0];
    assert_eq!(resumed.outcome, JobRunOutcome::Completed);
    assert_eq!(resumed.job.status, JobStatus::Success);
    assert!(resumed.job.waiting_for_event.is_none());
    assert_eq!(trail_of(&resumed.job), vec!["A", "P", "C"]);
    assert_eq!(resumed.job.metadata["resumedBy"]["payload"]["findings"], 3);
    assert_eq!(first.call_count(), 1);
    assert_eq!(pausing.call_count(), 2);
    assert_eq!(store.get(resumed.job.id).await.unwrap().status, JobStatus::Success);
}

#[tokio::test]
async fn test_unmatched_event_resumes_nothing() {
    let (runner, store) = runner_with(vec![Arc::new(PausingStage::new("P", ast_wait()))]);
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let runs = runner
        .deliver_event(ExternalEvent::new("ast.task.completed", "task-999", Value::Null))
        .await
        .unwrap();

    assert!(runs.is_empty());
    assert!(store.get(paused.job.id).await.unwrap().is_waiting());
}

#[tokio::test]
async fn test_sweep_expires_wait_at_deadline() {
    let (runner, store) = runner_with(vec![Arc::new(PausingStage::new("P", ast_wait()))]);
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    let paused_at = paused.job.waiting_for_event.clone().unwrap().paused_at;

    let early = runner
        .sweep_timeouts(paused_at + ChronoDuration::milliseconds(59_999))
        .await
        .unwrap();
    assert!(early.is_empty());

    let expired = runner
        .sweep_timeouts(paused_at + ChronoDuration::milliseconds(60_000))
        .await
        .unwrap();
    assert_eq!(expired, vec![paused.job.id]);

    let job = store.get(paused.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_classification, Some(ErrorClassification::Timeout));
    assert!(job.waiting_for_event.is_none());

    let late = runner
        .deliver_event(ExternalEvent::new("ast.task.completed", "task-123", Value::Null))
        .await
        .unwrap();
    assert!(late.is_empty());
}

#[tokio::test]
async fn test_late_event_times_the_job_out() {
    let (runner, _) = runner_with(vec![Arc::new(PausingStage::new("P", ast_wait()))]);
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    let paused_at = paused.job.waiting_for_event.clone().unwrap().paused_at;

    let runs = runner
        .deliver_event(
            ExternalEvent::new("ast.task.completed", "task-123", Value::Null)
                .at(paused_at + ChronoDuration::milliseconds(60_000)),
        )
        .await
        .unwrap();

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].outcome, JobRunOutcome::TimedOut);
    assert_eq!(runs[0].job.status, JobStatus::Error);
    assert_eq!(runs[0].job.error_classification, Some(ErrorClassification::Timeout));
}

#[tokio::test]
async fn test_zero_timeout_uses_configured_default() {
    let wait = WaitRequest::new("ast.task.completed", "task-123", Duration::ZERO);
    let (runner, _) = runner_with(vec![Arc::new(PausingStage::new("P", wait))]);

    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let waiting = paused.job.waiting_for_event.unwrap();
    assert_eq!(waiting.timeout_ms, runner.config().default_event_timeout_ms);
}

#[tokio::test]
async fn test_retryable_failure_requeues_once_then_errors() {
    let flaky = Arc::new(FailingStage::new(
        "B",
        StageError::fatal("upstream 503").with_classification(ErrorClassification::ExternalService),
    ));
    let (runner, store) = runner_with(vec![Arc::new(AppendStage::new("A")), flaky.clone()]);
    let job = runner
        .new_job(WORKFLOW, payload())
        .with_handler_type(HandlerType::QueuedTask)
        .with_max_retries(1);
    let correlation_id = job.correlation_id.clone();

    let queued = runner.submit(job).await.unwrap();
    assert_eq!(queued.outcome, JobRunOutcome::Queued);
    assert_eq!(queued.job.status, JobStatus::Pending);

    let first = runner.run_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(first.outcome, JobRunOutcome::Requeued);
    assert_eq!(first.job.status, JobStatus::Pending);
    assert_eq!(first.job.retry_count, 1);
    assert_eq!(first.job.current_stage.as_deref(), Some("B"));
    assert_eq!(first.job.error_classification, Some(ErrorClassification::ExternalService));

    assert!(runner.run_next(Utc::now()).await.unwrap().is_none());

    let second = runner
        .run_next(Utc::now() + ChronoDuration::seconds(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.outcome, JobRunOutcome::Failed);
    assert_eq!(second.job.status, JobStatus::Error);
    assert_eq!(second.job.retry_count, 1);
    assert_eq!(second.job.correlation_id, correlation_id);
    assert_eq!(
        second.job.last_error.as_deref(),
        Some("Stage 'B' failed (Error: upstream 503)")
    );
    assert_eq!(flaky.call_count(), 2);
    assert!(store.ids_with_status(JobStatus::Pending).is_empty());
}

#[tokio::test]
async fn test_non_retryable_fatal_failure_is_terminal() {
    let (runner, _) = runner_with(vec![Arc::new(FailingStage::new("B", StageError::fatal("bad diff")))]);

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.outcome, JobRunOutcome::Failed);
    assert_eq!(run.job.status, JobStatus::Error);
    assert_eq!(run.job.retry_count, 0);
    assert_eq!(run.job.error_classification, Some(ErrorClassification::Unknown));
}

#[tokio::test]
async fn test_recoverable_failure_yields_partial_error() {
    let (runner, _) = runner_with(vec![
        Arc::new(AppendStage::new("A")),
        Arc::new(FailingStage::new("B", StageError::recoverable("lint service down"))),
        Arc::new(AppendStage::new("C")),
    ]);

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.job.status, JobStatus::PartialError);
    assert_eq!(run.job.recoverable_failures(), 1);
    assert_eq!(trail_of(&run.job), vec!["A", "C"]);
}

#[tokio::test]
async fn test_all_skipped_yields_skipped() {
    let (runner, _) = runner_with(vec![
        Arc::new(SkippingStage::new("X", PipelineReason::new("Draft PR"))),
        Arc::new(SkippingStage::new("Y", PipelineReason::new("No files changed"))),
    ]);

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.outcome, JobRunOutcome::Completed);
    assert_eq!(run.job.status, JobStatus::Skipped);
}

#[tokio::test]
async fn test_stage_acting_after_resume_is_not_skipped() {
    let (runner, _) = runner_with(vec![
        Arc::new(SkippingStage::new("X", PipelineReason::new("Draft PR"))),
        Arc::new(PausingStage::new("P", ast_wait())),
        Arc::new(SkippingStage::new("Y", PipelineReason::new("No files changed"))),
    ]);

    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    assert_eq!(paused.job.acted_stages(), 0);

    let runs = runner
        .deliver_event(ExternalEvent::new("ast.task.completed", "task-123", Value::Null))
        .await
        .unwrap();

    assert_eq!(runs[0].job.status, JobStatus::Success);
    assert_eq!(runs[0].job.acted_stages(), 1);
}

#[tokio::test]
async fn test_cancel_during_run_stops_before_next_stage() {
    let store = Arc::new(InMemoryJobStore::new());
    let after = Arc::new(AppendStage::new("after"));
    let strategy = strategy_of(
        "review",
        vec![
            Arc::new(AppendStage::new("before")),
            Arc::new(CancellingStage { store: Arc::clone(&store) }),
            after.clone(),
        ],
    )
    .unwrap();
    let registry = StrategyRegistry::<TraceContext>::new().with_strategy(WORKFLOW, Arc::new(strategy));
    let runner = JobRunner::new(Arc::clone(&store), registry, PipelineExecutor::<TraceContext>::new());

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.outcome, JobRunOutcome::Cancelled);
    assert_eq!(run.job.status, JobStatus::Error);
    assert_eq!(run.job.error_classification, Some(ErrorClassification::Cancelled));
    assert_eq!(run.job.last_error.as_deref(), Some("closed by operator"));
    assert_eq!(after.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_paused_job() {
    let (runner, _) = runner_with(vec![Arc::new(PausingStage::new("P", ast_wait()))]);
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let cancelled = runner.cancel_job(paused.job.id, "PR closed").await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Error);
    assert_eq!(cancelled.error_classification, Some(ErrorClassification::Cancelled));

    let runs = runner
        .deliver_event(ExternalEvent::new("ast.task.completed", "task-123", Value::Null))
        .await
        .unwrap();
    assert!(runs.is_empty());
    assert!(runner.cancel_job(paused.job.id, "again").await.is_err());
}

#[tokio::test]
async fn test_terminal_job_cannot_be_rerun() {
    let (runner, _) = runner_with(vec![Arc::new(AppendStage::new("A"))]);
    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let err = runner.run_job(run.job.id).await.unwrap_err();

    assert!(matches!(
        err,
        ReviewflowError::InvalidTransition(JobTransitionError::Terminal { status: JobStatus::Success, .. })
    ));
}

#[tokio::test]
async fn test_paused_job_cannot_be_run_directly() {
    let (runner, _) = runner_with(vec![Arc::new(PausingStage::new("P", ast_wait()))]);
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let err = runner.run_job(paused.job.id).await.unwrap_err();

    assert!(matches!(
        err,
        ReviewflowError::InvalidTransition(JobTransitionError::StillWaiting { .. })
    ));
}

#[tokio::test]
async fn test_unknown_workflow_type_fails_validation() {
    let (runner, _) = runner_with(vec![Arc::new(AppendStage::new("A"))]);

    let run = runner.submit(runner.new_job("security-scan", payload())).await.unwrap();

    assert_eq!(run.outcome, JobRunOutcome::Failed);
    assert_eq!(run.job.error_classification, Some(ErrorClassification::Validation));
    assert_eq!(
        run.job.last_error.as_deref(),
        Some("No pipeline for workflow type (Error: Unknown strategy: security-scan)")
    );
}

#[tokio::test]
async fn test_default_strategy_mode_from_config() {
    let (runner, _) = runner_with(vec![Arc::new(AppendStage::new("A"))]);
    let runner = runner.with_config(config().with_default_strategy_mode(WORKFLOW));

    let run = runner.submit(runner.new_job("security-scan", payload())).await.unwrap();

    assert_eq!(run.job.status, JobStatus::Success);
}

#[tokio::test]
async fn test_invalid_payload_fails_validation() {
    let (runner, _) = runner_with(vec![Arc::new(AppendStage::new("A"))]);

    let run = runner.submit(runner.new_job(WORKFLOW, json!({"trail": 7}))).await.unwrap();

    assert_eq!(run.job.status, JobStatus::Error);
    assert_eq!(run.job.error_classification, Some(ErrorClassification::Validation));
}

#[tokio::test]
async fn test_run_next_takes_highest_priority() {
    let (runner, _) = runner_with(vec![Arc::new(AppendStage::new("A"))]);
    let low = runner
        .submit(runner.new_job(WORKFLOW, payload()).with_handler_type(HandlerType::QueuedTask))
        .await
        .unwrap();
    let high = runner
        .submit(
            runner
                .new_job(WORKFLOW, payload())
                .with_handler_type(HandlerType::QueuedTask)
                .with_priority(10),
        )
        .await
        .unwrap();

    let now = Utc::now() + ChronoDuration::seconds(1);
    let first = runner.run_next(now).await.unwrap().unwrap();
    let second = runner.run_next(now).await.unwrap().unwrap();

    assert_eq!(first.job.id, high.job.id);
    assert_eq!(second.job.id, low.job.id);
    assert!(runner.run_next(now).await.unwrap().is_none());
}

#[tokio::test]
async fn test_event_listener_resumes_jobs_from_channel() {
    let (runner, store) = runner_with(vec![Arc::new(PausingStage::new("P", ast_wait()))]);
    let runner = Arc::new(runner);
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let listener = runner.spawn_event_listener(rx);
    tx.send(ExternalEvent::new("ast.task.completed", "task-123", Value::Null))
        .await
        .unwrap();
    drop(tx);
    listener.await.unwrap();

    assert_eq!(store.get(paused.job.id).await.unwrap().status, JobStatus::Success);
}

#[tokio::test]
async fn test_sweeper_expires_jobs_until_shutdown() {
    let wait = WaitRequest::new("ast.task.completed", "task-123", Duration::from_millis(1));
    let (runner, store) = runner_with(vec![Arc::new(PausingStage::new("P", wait))]);
    let runner = Arc::new(runner.with_config(config().with_sweep_interval_ms(10)));
    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run_sweeper(shutdown_rx).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    sweeper.await.unwrap();

    let job = store.get(paused.job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error_classification, Some(ErrorClassification::Timeout));
}

/// Store whose updates fail for one job once that job is marked broken.
#[derive(Default)]
struct BrokenUpdateStore {
    inner: InMemoryJobStore,
    broken: parking_lot::Mutex<Option<Uuid>>,
}

#[async_trait]
impl WorkflowJobRepository for BrokenUpdateStore {
    async fn create(&self, job: WorkflowJob) -> Result<WorkflowJob, ReviewflowError> {
        self.inner.create(job).await
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowJob, ReviewflowError> {
        self.inner.get(id).await
    }

    async fn update(&self, job: WorkflowJob) -> Result<WorkflowJob, ReviewflowError> {
        if *self.broken.lock() == Some(job.id) {
            return Err(ReviewflowError::Repository("connection reset".to_string()));
        }
        self.inner.update(job).await
    }

    async fn find_waiting_for(&self, event_type: &str, event_key: &str) -> Result<Vec<WorkflowJob>, ReviewflowError> {
        self.inner.find_waiting_for(event_type, event_key).await
    }

    async fn find_paused(&self) -> Result<Vec<WorkflowJob>, ReviewflowError> {
        self.inner.find_paused().await
    }
}

#[async_trait]
impl JobQueue for BrokenUpdateStore {
    async fn enqueue(&self, job: WorkflowJob) -> Result<Uuid, ReviewflowError> {
        self.inner.enqueue(job).await
    }

    async fn claim_next(&self, now: chrono::DateTime<Utc>) -> Result<Option<WorkflowJob>, ReviewflowError> {
        self.inner.claim_next(now).await
    }
}

#[tokio::test]
async fn test_event_delivery_continues_past_a_failing_job() {
    let strategy = Arc::new(
        strategy_of(
            "review",
            vec![
                Arc::new(PausingStage::new("P", ast_wait()).with_pauses(2)),
                Arc::new(AppendStage::new("C")),
            ],
        )
        .unwrap(),
    );
    let registry = StrategyRegistry::<TraceContext>::new().with_strategy(WORKFLOW, strategy);
    let store = Arc::new(BrokenUpdateStore::default());
    let runner = JobRunner::new(Arc::clone(&store), registry, PipelineExecutor::<TraceContext>::new())
        .with_config(config());

    let first = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    let second = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    *store.broken.lock() = Some(first.job.id);

    let runs = runner
        .deliver_event(ExternalEvent::new("ast.task.completed", "task-123", Value::Null))
        .await
        .unwrap();

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].job.id, second.job.id);
    assert_eq!(runs[0].job.status, JobStatus::Success);
    assert!(store.inner.get(first.job.id).await.unwrap().is_waiting());
}

async fn run_pause_and_resume_with_log(log: Arc<InMemoryExecutionLogRepository>) -> String {
    let strategy = strategy_of(
        "review",
        vec![Arc::new(AppendStage::new("A")), Arc::new(PausingStage::new("P", ast_wait()))],
    )
    .unwrap();
    let registry = StrategyRegistry::<TraceContext>::new().with_strategy(WORKFLOW, Arc::new(strategy));
    let executor = PipelineExecutor::<TraceContext>::new()
        .with_observer(Arc::new(ExecutionLogObserver::new(log.clone())));
    let runner = JobRunner::new(Arc::new(InMemoryJobStore::new()), registry, executor);

    let paused = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();
    let correlation_id = paused.job.correlation_id.clone();

    let waiting = log
        .find_latest_in_progress(&correlation_id, "P")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(waiting.metadata["waitingForEvent"]["eventType"], "ast.task.completed");
    assert_eq!(waiting.metadata["waitingForEvent"]["eventKey"], "task-123");

    let resumed = runner
        .deliver_event(ExternalEvent::new("ast.task.completed", "task-123", Value::Null))
        .await
        .unwrap();
    assert_eq!(resumed[0].job.status, JobStatus::Success);
    correlation_id
}

fn stage_statuses(entries: &[crate::execution_log::ExecutionLogEntry]) -> Vec<(String, LogStatus)> {
    entries
        .iter()
        .map(|e| (e.stage_name.clone(), e.status))
        .collect()
}

#[tokio::test]
async fn test_execution_log_closes_stages_across_pause() {
    let log = Arc::new(InMemoryExecutionLogRepository::new());
    let correlation_id = run_pause_and_resume_with_log(log.clone()).await;

    let entries = log
        .find(&LogFilter::new().with_execution_id(correlation_id.clone()))
        .await
        .unwrap();
    assert_eq!(
        stage_statuses(&entries),
        vec![
            ("A".to_string(), LogStatus::Success),
            ("P".to_string(), LogStatus::Success),
        ]
    );
    assert_eq!(entries[1].metadata["resumedFrom"]["eventKey"], "task-123");
    assert!(log.find_latest_in_progress(&correlation_id, "A").await.unwrap().is_none());
    assert!(log.find_latest_in_progress(&correlation_id, "P").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reject_duplicates_log_accepts_resumed_stage() {
    let config = config().with_in_progress_policy(InProgressPolicy::RejectDuplicates);
    let log = Arc::new(InMemoryExecutionLogRepository::from_config(&config));
    let correlation_id = run_pause_and_resume_with_log(log.clone()).await;

    let entries = log
        .find(&LogFilter::new().with_execution_id(correlation_id.clone()))
        .await
        .unwrap();
    assert_eq!(
        stage_statuses(&entries),
        vec![
            ("A".to_string(), LogStatus::Success),
            ("P".to_string(), LogStatus::Success),
        ]
    );
    assert!(log.find_latest_in_progress(&correlation_id, "P").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fail_fast_config_aborts_on_recoverable_failure() {
    let b = Arc::new(AppendStage::new("B"));
    let (runner, _) = runner_with(vec![
        Arc::new(FailingStage::new("A", StageError::recoverable("lint crashed"))),
        b.clone(),
    ]);
    let runner = runner.with_config(config().with_failure_mode(FailureMode::FailFast));

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.outcome, JobRunOutcome::Failed);
    assert_eq!(run.job.status, JobStatus::Error);
    assert_eq!(run.job.last_error.as_deref(), Some("Stage 'A' failed (Error: lint crashed)"));
    assert_eq!(b.call_count(), 0);
}

#[tokio::test]
async fn test_config_keeps_executor_critical_stages() {
    let strategy = Arc::new(
        strategy_of(
            "review",
            vec![
                Arc::new(FailingStage::new("auth", StageError::recoverable("expired token"))),
                Arc::new(AppendStage::new("B")),
            ],
        )
        .unwrap(),
    );
    let registry = StrategyRegistry::<TraceContext>::new().with_strategy(WORKFLOW, strategy);
    let executor = PipelineExecutor::<TraceContext>::new()
        .with_failure_policy(FailurePolicy::default().with_critical_stage("auth"));
    let runner = JobRunner::new(Arc::new(InMemoryJobStore::new()), registry, executor)
        .with_config(config().with_failure_mode(FailureMode::ContinueOnFailure));

    let run = runner.submit(runner.new_job(WORKFLOW, payload())).await.unwrap();

    assert_eq!(run.job.status, JobStatus::Error);
    assert_eq!(runner.executor().failure_policy().mode, FailureMode::ContinueOnFailure);
}

#[test]
fn test_stage_idempotency_key_is_stable_across_retries() {
    let job = WorkflowJob::new(WORKFLOW, Value::Null);
    let first = stage_idempotency_key(&job.correlation_id, "post_comment");
    let retried = job.clone().with_max_retries(5);
    assert_eq!(first, stage_idempotency_key(&retried.correlation_id, "post_comment"));
    assert_ne!(first, stage_idempotency_key(&job.correlation_id, "ast_analysis"));
}
