//! Ordered, isolated observer dispatch.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

use super::{ObserverError, ObserverOptions, PipelineObserver};
use crate::context::PipelineContext;
use crate::errors::StageError;
use crate::stages::WaitRequest;

/// An ordered list of observers.
pub struct ObserverChain<C: PipelineContext> {
    observers: Vec<Arc<dyn PipelineObserver<C>>>,
}

impl<C: PipelineContext> ObserverChain<C> {
    /// Creates a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Appends an observer. Call order equals insertion order.
    pub fn add(&mut self, observer: Arc<dyn PipelineObserver<C>>) {
        self.observers.push(observer);
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver<C>>) -> Self {
        self.add(observer);
        self
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notifies every observer that `stage_name` is starting.
    pub async fn notify_start(&self, stage_name: &str, context: &C, options: &ObserverOptions) {
        for observer in &self.observers {
            isolate(
                observer.name(),
                "on_stage_start",
                observer.on_stage_start(stage_name, context, options),
            )
            .await;
        }
    }

    /// Notifies every observer that `stage_name` finished.
    pub async fn notify_finish(&self, stage_name: &str, context: &C, options: &ObserverOptions) {
        for observer in &self.observers {
            isolate(
                observer.name(),
                "on_stage_finish",
                observer.on_stage_finish(stage_name, context, options),
            )
            .await;
        }
    }

    /// Notifies every observer that `stage_name` failed.
    pub async fn notify_error(
        &self,
        stage_name: &str,
        error: &StageError,
        context: &C,
        options: &ObserverOptions,
    ) {
        for observer in &self.observers {
            isolate(
                observer.name(),
                "on_stage_error",
                observer.on_stage_error(stage_name, error, context, options),
            )
            .await;
        }
    }

    /// Notifies every observer that `stage_name` skipped.
    pub async fn notify_skipped(
        &self,
        stage_name: &str,
        reason: &str,
        context: &C,
        options: &ObserverOptions,
    ) {
        for observer in &self.observers {
            isolate(
                observer.name(),
                "on_stage_skipped",
                observer.on_stage_skipped(stage_name, reason, context, options),
            )
            .await;
        }
    }

    /// Notifies every observer that `stage_name` paused the run.
    pub async fn notify_paused(
        &self,
        stage_name: &str,
        wait: &WaitRequest,
        context: &C,
        options: &ObserverOptions,
    ) {
        for observer in &self.observers {
            isolate(
                observer.name(),
                "on_stage_paused",
                observer.on_stage_paused(stage_name, wait, context, options),
            )
            .await;
        }
    }
}

impl<C: PipelineContext> Default for ObserverChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> Clone for ObserverChain<C> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

impl<C: PipelineContext> std::fmt::Debug for ObserverChain<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("ObserverChain").field("observers", &names).finish()
    }
}

async fn isolate<F>(observer: &str, hook: &'static str, call: F)
where
    F: Future<Output = Result<(), ObserverError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(observer = %observer, hook, error = %err, "Observer hook failed");
        }
        Err(panic) => {
            warn!(
                observer = %observer,
                hook,
                panic = %panic_message(panic.as_ref()),
                "Observer hook panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PanickingObserver, RecordingObserver};
    use async_trait::async_trait;

    struct FailingObserver;

    #[async_trait]
    impl PipelineObserver<String> for FailingObserver {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_stage_start(
            &self,
            _stage_name: &str,
            _context: &String,
            _options: &ObserverOptions,
        ) -> Result<(), ObserverError> {
            Err(ObserverError::new("sink unavailable"))
        }
    }

    #[tokio::test]
    async fn test_chain_creation() {
        let chain = ObserverChain::<String>::new();
        assert!(chain.is_empty());
    }

    #[tokio::test]
    async fn test_chain_isolates_errors_and_panics() {
        let recorder = Arc::new(RecordingObserver::new());
        let chain = ObserverChain::<String>::new()
            .with_observer(Arc::new(FailingObserver))
            .with_observer(Arc::new(PanickingObserver::new()))
            .with_observer(recorder.clone());

        assert_eq!(chain.len(), 3);

        let ctx = "ctx".to_string();
        let options = ObserverOptions::new();
        chain.notify_start("fetch", &ctx, &options).await;
        chain.notify_finish("fetch", &ctx, &options).await;

        assert_eq!(
            recorder.calls(),
            vec!["start:fetch".to_string(), "finish:fetch".to_string()]
        );
    }

    #[tokio::test]
    async fn test_chain_preserves_order() {
        let first = Arc::new(RecordingObserver::new());
        let second = Arc::new(RecordingObserver::new());
        let shared = Arc::new(parking_lot::Mutex::new(Vec::new()));

        struct Tagged(&'static str, Arc<parking_lot::Mutex<Vec<&'static str>>>);

        #[async_trait]
        impl PipelineObserver<String> for Tagged {
            async fn on_stage_start(
                &self,
                _stage_name: &str,
                _context: &String,
                _options: &ObserverOptions,
            ) -> Result<(), ObserverError> {
                self.1.lock().push(self.0);
                Ok(())
            }
        }

        let chain = ObserverChain::<String>::new()
            .with_observer(Arc::new(Tagged("a", Arc::clone(&shared))))
            .with_observer(first.clone())
            .with_observer(Arc::new(Tagged("b", Arc::clone(&shared))))
            .with_observer(second.clone());

        chain.notify_start("fetch", &String::new(), &ObserverOptions::new()).await;

        assert_eq!(*shared.lock(), vec!["a", "b"]);
        assert_eq!(first.calls(), second.calls());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
