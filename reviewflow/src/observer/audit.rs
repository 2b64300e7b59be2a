//! Observer that writes the execution log.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ObserverError, ObserverOptions, PipelineObserver};
use crate::context::PipelineContext;
use crate::errors::StageError;
use crate::execution_log::{ExecutionLogEntry, ExecutionLogRepository, LogStatus};
use crate::reason::{messages, ErrorDetail};
use crate::stages::WaitRequest;

/// Metadata key set on an open entry while its stage waits for an event.
const WAITING_FOR_EVENT: &str = "waitingForEvent";

/// Keeps one entry per stage attempt.
///
/// A stage start opens an `IN_PROGRESS` entry; finish, error and skip close
/// that entry in place with the final status. A pause leaves the entry open
/// and marks it `waitingForEvent`, and the resumed start reuses it, so a
/// paused stage never holds two open entries.
///
/// Requires `ObserverOptions::execution_id`; calls without one are reported
/// as observer errors and therefore only logged.
pub struct ExecutionLogObserver {
    repository: Arc<dyn ExecutionLogRepository>,
}

impl ExecutionLogObserver {
    /// Creates an observer writing to `repository`.
    #[must_use]
    pub fn new(repository: Arc<dyn ExecutionLogRepository>) -> Self {
        Self { repository }
    }

    async fn open_entry(&self, stage_name: &str, options: &ObserverOptions) -> Result<(), ObserverError> {
        let execution_id = execution_id(options)?;

        if let Some(mut open) = self
            .repository
            .find_latest_in_progress(execution_id, stage_name)
            .await?
        {
            if let Some(waited_for) = open.metadata.remove(WAITING_FOR_EVENT) {
                open.metadata.insert("resumedFrom".to_string(), waited_for);
                self.repository.update(open).await?;
                return Ok(());
            }
        }

        let entry = ExecutionLogEntry::new(execution_id, stage_name, LogStatus::InProgress, "");
        self.repository.create(describe(entry, options)).await?;
        Ok(())
    }

    async fn close_entry(
        &self,
        stage_name: &str,
        status: LogStatus,
        message: String,
        options: &ObserverOptions,
        extra: Option<(&str, Value)>,
    ) -> Result<(), ObserverError> {
        debug_assert!(status.is_final());
        let execution_id = execution_id(options)?;

        match self
            .repository
            .find_latest_in_progress(execution_id, stage_name)
            .await?
        {
            Some(mut entry) => {
                entry.status = status;
                entry.message = message;
                if let Some((key, value)) = extra {
                    entry.metadata.insert(key.to_string(), value);
                }
                self.repository.update(entry).await?;
            }
            // No start was recorded, e.g. the start write failed.
            None => {
                let mut entry = describe(
                    ExecutionLogEntry::new(execution_id, stage_name, status, message),
                    options,
                );
                if let Some((key, value)) = extra {
                    entry.metadata.insert(key.to_string(), value);
                }
                self.repository.create(entry).await?;
            }
        }
        Ok(())
    }

    async fn mark_waiting(
        &self,
        stage_name: &str,
        wait: &WaitRequest,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        let execution_id = execution_id(options)?;
        let waiting = json!({
            "eventType": wait.event_type,
            "eventKey": wait.event_key,
            "timeoutMs": u64::try_from(wait.timeout.as_millis()).unwrap_or(u64::MAX),
        });

        match self
            .repository
            .find_latest_in_progress(execution_id, stage_name)
            .await?
        {
            Some(mut open) => {
                open.metadata.insert(WAITING_FOR_EVENT.to_string(), waiting);
                self.repository.update(open).await?;
            }
            None => {
                let entry = ExecutionLogEntry::new(execution_id, stage_name, LogStatus::InProgress, "")
                    .with_metadata(WAITING_FOR_EVENT, waiting);
                self.repository.create(describe(entry, options)).await?;
            }
        }
        Ok(())
    }
}

fn execution_id(options: &ObserverOptions) -> Result<&str, ObserverError> {
    options
        .execution_id
        .as_deref()
        .ok_or_else(|| ObserverError::new("no execution id for execution log entry"))
}

fn describe(mut entry: ExecutionLogEntry, options: &ObserverOptions) -> ExecutionLogEntry {
    if let Some(label) = &options.label {
        entry = entry.with_metadata("label", Value::from(label.as_str()));
    }
    if let Some(visibility) = options.visibility {
        entry = entry.with_metadata("visibility", Value::from(visibility.to_string()));
    }
    entry
}

impl std::fmt::Debug for ExecutionLogObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLogObserver").finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: PipelineContext> PipelineObserver<C> for ExecutionLogObserver {
    fn name(&self) -> &str {
        "execution_log"
    }

    async fn on_stage_start(
        &self,
        stage_name: &str,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.open_entry(stage_name, options).await
    }

    async fn on_stage_finish(
        &self,
        stage_name: &str,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.close_entry(stage_name, LogStatus::Success, String::new(), options, None)
            .await
    }

    async fn on_stage_error(
        &self,
        stage_name: &str,
        error: &StageError,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        let message = messages::error("Stage failed", Some(&ErrorDetail::from(error)));
        let detail = json!({
            "kind": error.kind,
            "classification": error.classification,
        });
        self.close_entry(stage_name, LogStatus::Error, message, options, Some(("error", detail)))
            .await
    }

    async fn on_stage_skipped(
        &self,
        stage_name: &str,
        reason: &str,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.close_entry(stage_name, LogStatus::Skipped, reason.to_string(), options, None)
            .await
    }

    async fn on_stage_paused(
        &self,
        stage_name: &str,
        wait: &WaitRequest,
        _context: &C,
        options: &ObserverOptions,
    ) -> Result<(), ObserverError> {
        self.mark_waiting(stage_name, wait, options).await
    }
}
