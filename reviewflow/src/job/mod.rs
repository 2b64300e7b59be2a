//! Workflow jobs: persisted, resumable pipeline invocations.
//!
//! A [`WorkflowJob`] moves `PENDING → IN_PROGRESS → {SUCCESS, ERROR,
//! PARTIAL_ERROR, SKIPPED}`. While `IN_PROGRESS` it may be paused, which is
//! represented only by a populated `waiting_for_event`. Terminal statuses
//! never change again.
//!
//! The [`JobRunner`] applies executor outcomes to jobs: it checkpoints the
//! resume pointer after every stage, pauses on a [`WaitRequest`], resumes on
//! a matching [`ExternalEvent`], expires overdue waits, and re-enqueues
//! retryable failures with backoff.
//!
//! [`WaitRequest`]: crate::stages::WaitRequest

mod idempotency;
mod model;
mod repository;
mod retry;
mod runner;

#[cfg(test)]
mod runner_tests;

pub use idempotency::stage_idempotency_key;
pub use model::{
    FailureDisposition, HandlerType, JobStatus, JobTransitionError, WaitingForEvent, WorkflowJob,
};
pub use repository::{InMemoryJobStore, JobQueue, WorkflowJobRepository};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use runner::{ExternalEvent, JobRun, JobRunOutcome, JobRunner};
