//! Workflow job persistence and queueing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{JobStatus, JobTransitionError, WorkflowJob};
use crate::errors::{Result, ReviewflowError};

/// Storage contract for workflow jobs.
#[async_trait]
pub trait WorkflowJobRepository: Send + Sync {
    /// Stores a new job.
    async fn create(&self, job: WorkflowJob) -> Result<WorkflowJob>;

    /// Loads a job.
    async fn get(&self, id: Uuid) -> Result<WorkflowJob>;

    /// Replaces a stored job. Terminal jobs cannot be changed.
    async fn update(&self, job: WorkflowJob) -> Result<WorkflowJob>;

    /// Returns paused jobs waiting for `(event_type, event_key)`.
    async fn find_waiting_for(&self, event_type: &str, event_key: &str) -> Result<Vec<WorkflowJob>>;

    /// Returns every paused job.
    async fn find_paused(&self) -> Result<Vec<WorkflowJob>>;
}

/// Queue contract used by workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds a `PENDING` job and returns its id.
    async fn enqueue(&self, job: WorkflowJob) -> Result<Uuid>;

    /// Atomically claims the next runnable job and moves it to `IN_PROGRESS`.
    ///
    /// Runnable means `PENDING` with `scheduled_at <= now`. Higher priority
    /// wins, then the earliest `scheduled_at`.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<WorkflowJob>>;
}

/// In-memory job store and queue.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, WorkflowJob>,
    claim_lock: Mutex<()>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no job is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Returns the ids of jobs with `status`.
    #[must_use]
    pub fn ids_with_status(&self, status: JobStatus) -> Vec<Uuid> {
        self.jobs
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| *entry.key())
            .collect()
    }

    fn collect_where<F>(&self, predicate: F) -> Vec<WorkflowJob>
    where
        F: Fn(&WorkflowJob) -> bool,
    {
        let mut jobs: Vec<WorkflowJob> = self
            .jobs
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }
}

#[async_trait]
impl WorkflowJobRepository for InMemoryJobStore {
    async fn create(&self, job: WorkflowJob) -> Result<WorkflowJob> {
        if self.jobs.contains_key(&job.id) {
            return Err(ReviewflowError::Repository(format!("Job {} already exists", job.id)));
        }
        debug!(job_id = %job.id, workflow_type = %job.workflow_type, "Created workflow job");
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowJob> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(ReviewflowError::JobNotFound(id))
    }

    async fn update(&self, mut job: WorkflowJob) -> Result<WorkflowJob> {
        let mut stored = self
            .jobs
            .get_mut(&job.id)
            .ok_or(ReviewflowError::JobNotFound(job.id))?;

        if stored.status.is_terminal() {
            return Err(JobTransitionError::Terminal {
                job_id: stored.id,
                status: stored.status,
                action: "be updated",
            }
            .into());
        }

        job.updated_at = Utc::now();
        *stored = job.clone();
        Ok(job)
    }

    async fn find_waiting_for(&self, event_type: &str, event_key: &str) -> Result<Vec<WorkflowJob>> {
        Ok(self.collect_where(|job| {
            !job.status.is_terminal()
                && job
                    .waiting_for_event
                    .as_ref()
                    .is_some_and(|waiting| waiting.matches(event_type, event_key))
        }))
    }

    async fn find_paused(&self) -> Result<Vec<WorkflowJob>> {
        Ok(self.collect_where(|job| !job.status.is_terminal() && job.is_waiting()))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobStore {
    async fn enqueue(&self, job: WorkflowJob) -> Result<Uuid> {
        if job.status != JobStatus::Pending {
            return Err(JobTransitionError::InvalidState {
                job_id: job.id,
                status: job.status,
                action: "be enqueued",
            }
            .into());
        }
        let id = job.id;
        WorkflowJobRepository::create(self, job).await?;
        Ok(id)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<WorkflowJob>> {
        let _claim = self.claim_lock.lock();

        let candidate = self
            .jobs
            .iter()
            .filter(|entry| entry.status == JobStatus::Pending && entry.scheduled_at <= now)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .map(|entry| *entry.key());

        let Some(id) = candidate else {
            return Ok(None);
        };

        let mut job = self.jobs.get_mut(&id).ok_or(ReviewflowError::JobNotFound(id))?;
        job.start(now)?;
        job.updated_at = now;
        debug!(job_id = %id, priority = job.priority, "Claimed workflow job");
        Ok(Some(job.clone()))
    }
}
