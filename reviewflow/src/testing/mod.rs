//! Testing utilities for reviewflow pipelines.
//!
//! This module provides:
//! - A traceable context type
//! - Scripted stages (append, skip, fail, pause)
//! - Recording and panicking observers
//! - Assertions over recorded hook calls

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_hook_calls, assert_trail};
pub use fixtures::{strategy_of, TraceContext};
pub use mocks::{
    AppendStage, FailingStage, PanickingObserver, PausingStage, RecordingObserver, SkippingStage,
};
