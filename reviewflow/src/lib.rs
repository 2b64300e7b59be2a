//! # Reviewflow
//!
//! A staged pipeline executor with resumable workflow jobs, built for
//! automated review processes (pull-request review bots and similar).
//!
//! Reviewflow provides:
//!
//! - **Sequential stages**: a [`PipelineStrategy`] is an ordered list of
//!   [`PipelineStage`]s; each stage turns one immutable context into the next
//! - **Skips and failures with reasons**: stages skip with a
//!   [`PipelineReason`]; failures are fatal or recoverable [`StageError`]s
//! - **Observers**: start/finish/error/skip hooks, isolated from the run
//! - **Execution log**: an audit trail of stage attempts per execution id
//! - **Workflow jobs**: persisted runs that pause on external events, resume
//!   at the stage that paused, time out, retry with backoff and can be
//!   cancelled
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reviewflow::prelude::*;
//! use std::sync::Arc;
//!
//! let strategy = StrategyBuilder::new("review")
//!     .stage(Arc::new(FetchDiffStage::new()))
//!     .stage(Arc::new(ReviewStage::new()))
//!     .build()?;
//!
//! let executor = PipelineExecutor::new().with_observer(Arc::new(TracingObserver::default()));
//! let report = executor.execute(&strategy, context).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod execution_log;
pub mod executor;
pub mod job;
pub mod observability;
pub mod observer;
pub mod reason;
pub mod stages;
pub mod strategy;
pub mod testing;

pub use errors::{ErrorClassification, Result, ReviewflowError, StageError, StageErrorKind};
pub use executor::{ExecutionReport, PipelineExecutor};
pub use reason::PipelineReason;
pub use stages::{PipelineStage, StageOutcome};
pub use strategy::PipelineStrategy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, LoggingConfig};
    pub use crate::context::{from_state, to_state, update, ContextExt, PipelineContext};
    pub use crate::errors::{
        ContractErrorInfo, ErrorClassification, PipelineValidationError, Result,
        ReviewflowError, StageError, StageErrorKind,
    };
    pub use crate::execution_log::{
        ExecutionLogEntry, ExecutionLogRepository, InMemoryExecutionLogRepository,
        InProgressPolicy, LogFilter, LogStatus,
    };
    pub use crate::executor::{
        ControlDecision, ExecutionOptions, ExecutionReport, ExecutionState, FailureMode,
        FailurePolicy, PipelineExecutor, RunControl, StageStatus,
    };
    pub use crate::job::{
        stage_idempotency_key, ExternalEvent, HandlerType, InMemoryJobStore, JobQueue,
        JobRunOutcome, JobRunner, JobStatus, RetryPolicy, WorkflowJob, WorkflowJobRepository,
    };
    pub use crate::observability::{init_tracing, SpanTimer};
    pub use crate::observer::{
        ExecutionLogObserver, ObserverChain, ObserverError, ObserverOptions, PipelineObserver,
        TracingObserver,
    };
    pub use crate::reason::{messages, ErrorDetail, PipelineReason};
    pub use crate::stages::{
        FnStage, PassThroughStage, PipelineStage, StageOutcome, StageVisibility, WaitRequest,
    };
    pub use crate::strategy::{PipelineStrategy, StaticStrategy, StrategyBuilder, StrategyRegistry};
}
