//! Immutable pipeline context.
//!
//! The engine never inspects a context. It only threads the latest value from
//! one stage to the next and serializes it when a job pauses. Stages derive a
//! new value with [`update`] instead of mutating the one they received, so any
//! holder of an older value keeps a stable snapshot.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;

/// Bound satisfied by every value that can flow through a pipeline.
///
/// `Serialize`/`DeserializeOwned` are required so a paused job can persist the
/// context as its opaque `pipeline_state` blob.
pub trait PipelineContext: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> PipelineContext for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Materializes a new context reflecting the mutator's edits.
///
/// The mutator works on a private copy; `context` is left untouched.
#[must_use]
pub fn update<C, F>(context: &C, mutator: F) -> C
where
    C: Clone,
    F: FnOnce(&mut C),
{
    let mut draft = context.clone();
    mutator(&mut draft);
    draft
}

/// Method form of [`update`].
pub trait ContextExt: Clone {
    /// Returns an edited copy of `self`.
    #[must_use]
    fn updated<F>(&self, mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        update(self, mutator)
    }
}

impl<T: Clone> ContextExt for T {}

/// Serializes a context into the opaque blob stored on a paused job.
pub fn to_state<C: PipelineContext>(context: &C) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(context)?)
}

/// Restores a context from a persisted blob.
pub fn from_state<C: PipelineContext>(state: &serde_json::Value) -> Result<C> {
    Ok(serde_json::from_value(state.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PullRequest {
        title: String,
        files: Vec<String>,
    }

    fn sample() -> PullRequest {
        PullRequest {
            title: "Add parser".to_string(),
            files: vec!["src/lib.rs".to_string()],
        }
    }

    #[test]
    fn test_update_leaves_input_untouched() {
        let original = sample();
        let next = update(&original, |pr| pr.files.push("src/parser.rs".to_string()));

        assert_eq!(original.files.len(), 1);
        assert_eq!(next.files.len(), 2);
        assert_eq!(next.title, original.title);
    }

    #[test]
    fn test_updated_method_form() {
        let original = sample();
        let next = original.updated(|pr| pr.title = "Draft: Add parser".to_string());

        assert_eq!(original.title, "Add parser");
        assert_eq!(next.title, "Draft: Add parser");
    }

    #[test]
    fn test_noop_mutator_yields_equal_copy() {
        let original = sample();
        let next = update(&original, |_| {});
        assert_eq!(original, next);
    }

    #[test]
    fn test_state_round_trip() {
        let original = sample();
        let state = to_state(&original).unwrap();
        let restored: PullRequest = from_state(&state).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_from_state_rejects_wrong_shape() {
        let result: Result<PullRequest> = from_state(&serde_json::json!({"title": 3}));
        assert!(result.is_err());
    }
}
