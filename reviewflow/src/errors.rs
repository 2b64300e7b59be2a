//! Error types for the reviewflow engine.
//!
//! Stage-level failures are carried by [`StageError`], a fixed structured type
//! with a discriminant and a stable string form. Everything that crosses the
//! crate boundary is a [`ReviewflowError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::job::JobTransitionError;

/// Convenience result alias.
pub type Result<T, E = ReviewflowError> = std::result::Result<T, E>;

/// The main error type for reviewflow operations.
#[derive(Debug, Error)]
pub enum ReviewflowError {
    /// A strategy or resume pointer failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A stage failed fatally and the remaining stages were not run.
    #[error("Pipeline '{pipeline}' aborted at stage '{stage}': {error}")]
    PipelineAborted {
        /// The pipeline name.
        pipeline: String,
        /// The stage that failed.
        stage: String,
        /// The stage failure.
        error: StageError,
    },

    /// A workflow job state-machine violation.
    #[error("{0}")]
    InvalidTransition(#[from] JobTransitionError),

    /// The workflow job does not exist.
    #[error("Workflow job not found: {0}")]
    JobNotFound(Uuid),

    /// An execution log entry does not exist.
    #[error("Execution log entry not found: {0}")]
    LogEntryNotFound(Uuid),

    /// A second in-progress entry was written while one is still open.
    #[error("Stage '{stage_name}' already has an in-progress entry for execution {execution_id}")]
    DuplicateInProgress {
        /// The owning execution.
        execution_id: String,
        /// The stage name.
        stage_name: String,
    },

    /// No strategy is registered for the requested mode or workflow type.
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A storage backend failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ReviewflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Categorical tag attached to a job after a terminal or pausing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClassification {
    /// Bad input; retrying cannot help.
    Validation,
    /// A deadline elapsed.
    Timeout,
    /// A downstream service failed.
    ExternalService,
    /// Cancelled by an operator.
    Cancelled,
    /// Anything else.
    #[default]
    Unknown,
}

impl ErrorClassification {
    /// Returns true if a failure with this classification may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService | Self::Timeout)
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::ExternalService => write!(f, "EXTERNAL_SERVICE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Whether a stage failure stops the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Abort the remaining stages.
    Fatal,
    /// Record the failure and continue with the last good context.
    Recoverable,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Recoverable => write!(f, "recoverable"),
        }
    }
}

/// Structured failure raised by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct StageError {
    /// Fatal or recoverable, as declared by the stage.
    pub kind: StageErrorKind,
    /// Category used for retry decisions.
    pub classification: ErrorClassification,
    /// Human-readable message.
    pub message: String,
    /// Optional structured diagnostic payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            classification: ErrorClassification::Unknown,
            message: message.into(),
            detail: None,
        }
    }

    /// Creates a fatal stage error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Fatal, message)
    }

    /// Creates a recoverable stage error.
    #[must_use]
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Recoverable, message)
    }

    /// Sets the classification.
    #[must_use]
    pub fn with_classification(mut self, classification: ErrorClassification) -> Self {
        self.classification = classification;
        self
    }

    /// Attaches a structured detail payload.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Returns true if the stage declared the failure fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind == StageErrorKind::Fatal
    }

    /// Returns true if the classification allows a job-level retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.classification.is_retryable()
    }

    /// Stable, key-sorted JSON rendering used in logs and audit entries.
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| self.message.clone())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "STRATEGY-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a strategy or resume pointer is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}
