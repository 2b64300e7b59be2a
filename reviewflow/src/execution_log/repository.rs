//! Execution log storage.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ExecutionLogEntry, LogFilter, LogStatus};
use crate::config::EngineConfig;
use crate::errors::{Result, ReviewflowError};

/// How a second `IN_PROGRESS` entry for an open stage is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InProgressPolicy {
    /// Accept duplicates; readers pick the newest one.
    #[default]
    ReadTimeTieBreak,
    /// Refuse a new `IN_PROGRESS` entry while the pair's latest entry is
    /// still `IN_PROGRESS`.
    RejectDuplicates,
}

/// Storage contract for the execution log.
#[async_trait]
pub trait ExecutionLogRepository: Send + Sync {
    /// Appends an entry.
    async fn create(&self, entry: ExecutionLogEntry) -> Result<ExecutionLogEntry>;

    /// Replaces the stored entry with the same `uuid`.
    async fn update(&self, entry: ExecutionLogEntry) -> Result<ExecutionLogEntry>;

    /// Returns matching entries ordered by `created_at`.
    async fn find(&self, filter: &LogFilter) -> Result<Vec<ExecutionLogEntry>>;

    /// Returns the newest `IN_PROGRESS` entry for the pair, if any.
    async fn find_latest_in_progress(
        &self,
        execution_id: &str,
        stage_name: &str,
    ) -> Result<Option<ExecutionLogEntry>>;

    /// Deletes an entry. Returns false if it did not exist.
    async fn delete(&self, uuid: Uuid) -> Result<bool>;
}

/// In-memory execution log.
#[derive(Debug, Default)]
pub struct InMemoryExecutionLogRepository {
    entries: RwLock<Vec<ExecutionLogEntry>>,
    policy: InProgressPolicy,
}

impl InMemoryExecutionLogRepository {
    /// Creates an empty repository with the read-time tie-break policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty repository with `policy`.
    #[must_use]
    pub fn with_policy(policy: InProgressPolicy) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            policy,
        }
    }

    /// Creates an empty repository with the configured `in_progress_policy`.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_policy(config.in_progress_policy)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns every entry in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<ExecutionLogEntry> {
        self.entries.read().clone()
    }
}

/// Newest entry for the pair; later insertion wins a timestamp tie.
fn latest_for<'a>(
    entries: &'a [ExecutionLogEntry],
    execution_id: &str,
    stage_name: &str,
    status: Option<LogStatus>,
) -> Option<&'a ExecutionLogEntry> {
    entries
        .iter()
        .filter(|e| e.is_for(execution_id, stage_name))
        .filter(|e| status.map_or(true, |s| e.status == s))
        .max_by_key(|e| e.created_at)
}

#[async_trait]
impl ExecutionLogRepository for InMemoryExecutionLogRepository {
    async fn create(&self, entry: ExecutionLogEntry) -> Result<ExecutionLogEntry> {
        let mut entries = self.entries.write();

        if self.policy == InProgressPolicy::RejectDuplicates && entry.status == LogStatus::InProgress {
            let open = latest_for(&entries, &entry.execution_id, &entry.stage_name, None)
                .is_some_and(|latest| latest.status == LogStatus::InProgress);
            if open {
                return Err(ReviewflowError::DuplicateInProgress {
                    execution_id: entry.execution_id,
                    stage_name: entry.stage_name,
                });
            }
        }

        debug!(
            execution_id = %entry.execution_id,
            stage = %entry.stage_name,
            status = %entry.status,
            "Execution log entry created"
        );
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn update(&self, entry: ExecutionLogEntry) -> Result<ExecutionLogEntry> {
        let mut entries = self.entries.write();
        let slot = entries
            .iter_mut()
            .find(|e| e.uuid == entry.uuid)
            .ok_or(ReviewflowError::LogEntryNotFound(entry.uuid))?;
        *slot = entry.clone();
        Ok(entry)
    }

    async fn find(&self, filter: &LogFilter) -> Result<Vec<ExecutionLogEntry>> {
        let mut found: Vec<ExecutionLogEntry> = self
            .entries
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn find_latest_in_progress(
        &self,
        execution_id: &str,
        stage_name: &str,
    ) -> Result<Option<ExecutionLogEntry>> {
        let entries = self.entries.read();
        Ok(latest_for(&entries, execution_id, stage_name, Some(LogStatus::InProgress)).cloned())
    }

    async fn delete(&self, uuid: Uuid) -> Result<bool> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.uuid != uuid);
        Ok(entries.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn in_progress(at: chrono::DateTime<Utc>, message: &str) -> ExecutionLogEntry {
        ExecutionLogEntry::new("exec-1", "analyze", LogStatus::InProgress, message).with_created_at(at)
    }

    #[tokio::test]
    async fn test_find_latest_in_progress_picks_newest() {
        let repo = InMemoryExecutionLogRepository::new();
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(5);

        // Inserted out of order on purpose.
        let newer = repo.create(in_progress(t2, "second")).await.unwrap();
        repo.create(in_progress(t1, "first")).await.unwrap();

        let latest = repo.find_latest_in_progress("exec-1", "analyze").await.unwrap();
        assert_eq!(latest, Some(newer));
    }

    #[tokio::test]
    async fn test_from_config_applies_in_progress_policy() {
        let config = EngineConfig::new().with_in_progress_policy(InProgressPolicy::RejectDuplicates);
        let repo = InMemoryExecutionLogRepository::from_config(&config);

        repo.create(in_progress(Utc::now(), "first")).await.unwrap();
        let duplicate = repo.create(in_progress(Utc::now(), "second")).await;

        assert!(matches!(duplicate, Err(ReviewflowError::DuplicateInProgress { .. })));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_closed_stage_has_no_in_progress_entry() {
        let repo = InMemoryExecutionLogRepository::with_policy(InProgressPolicy::RejectDuplicates);
        let open = tokio_test::block_on(repo.create(in_progress(Utc::now(), ""))).unwrap();
        let closed = ExecutionLogEntry {
            status: LogStatus::Success,
            ..open
        };
        tokio_test::block_on(repo.update(closed)).unwrap();

        assert!(tokio_test::block_on(repo.find_latest_in_progress("exec-1", "analyze"))
            .unwrap()
            .is_none());
        assert!(tokio_test::block_on(repo.create(in_progress(Utc::now(), ""))).is_ok());
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_find_latest_in_progress_none() {
        let repo = InMemoryExecutionLogRepository::new();
        repo.create(ExecutionLogEntry::new("exec-1", "analyze", LogStatus::Success, "done"))
            .await
            .unwrap();

        assert!(repo.find_latest_in_progress("exec-1", "analyze").await.unwrap().is_none());
        assert!(repo.find_latest_in_progress("exec-2", "analyze").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_duplicates_policy() {
        let repo = InMemoryExecutionLogRepository::with_policy(InProgressPolicy::RejectDuplicates);
        let t1 = Utc::now();

        repo.create(in_progress(t1, "first")).await.unwrap();
        let err = repo.create(in_progress(t1 + Duration::seconds(1), "dup")).await.unwrap_err();
        assert!(matches!(err, ReviewflowError::DuplicateInProgress { .. }));

        // Closing the stage re-opens the slot.
        repo.create(
            ExecutionLogEntry::new("exec-1", "analyze", LogStatus::Success, "done")
                .with_created_at(t1 + Duration::seconds(2)),
        )
        .await
        .unwrap();
        repo.create(in_progress(t1 + Duration::seconds(3), "retry")).await.unwrap();
        assert_eq!(repo.len(), 3);
    }

    #[tokio::test]
    async fn test_tie_break_policy_accepts_duplicates() {
        let repo = InMemoryExecutionLogRepository::new();
        let t1 = Utc::now();

        repo.create(in_progress(t1, "first")).await.unwrap();
        repo.create(in_progress(t1, "dup")).await.unwrap();

        let latest = repo.find_latest_in_progress("exec-1", "analyze").await.unwrap().unwrap();
        assert_eq!(latest.message, "dup");
    }

    #[tokio::test]
    async fn test_find_orders_and_limits() {
        let repo = InMemoryExecutionLogRepository::new();
        let t0 = Utc::now();
        for (offset, stage) in [(2, "post"), (0, "fetch"), (1, "analyze")] {
            repo.create(
                ExecutionLogEntry::new("exec-1", stage, LogStatus::Success, "")
                    .with_created_at(t0 + Duration::seconds(offset)),
            )
            .await
            .unwrap();
        }

        let all = repo.find(&LogFilter::new().with_execution_id("exec-1")).await.unwrap();
        let names: Vec<_> = all.iter().map(|e| e.stage_name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "analyze", "post"]);

        let limited = repo.find(&LogFilter::new().with_limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].stage_name, "fetch");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = InMemoryExecutionLogRepository::new();
        let mut entry = repo
            .create(ExecutionLogEntry::new("exec-1", "fetch", LogStatus::InProgress, ""))
            .await
            .unwrap();

        entry.status = LogStatus::Success;
        repo.update(entry.clone()).await.unwrap();
        assert!(repo.find_latest_in_progress("exec-1", "fetch").await.unwrap().is_none());

        assert!(repo.delete(entry.uuid).await.unwrap());
        assert!(!repo.delete(entry.uuid).await.unwrap());
        assert!(matches!(
            repo.update(entry.clone()).await,
            Err(ReviewflowError::LogEntryNotFound(id)) if id == entry.uuid
        ));
    }
}
