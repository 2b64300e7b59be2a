//! Stage timing.

use std::time::Instant;
use tracing::{debug, field, info_span, Span};

/// Owns the `stage` span for one stage call and records its duration on it.
///
/// Run the stage future under [`span`](Self::span), then call
/// [`finish`](Self::finish): the elapsed time is written to the span's
/// `duration_ms` field and returned for the stage record.
#[derive(Debug)]
pub struct SpanTimer {
    span: Span,
    started: Instant,
}

impl SpanTimer {
    /// Opens the span for `stage_name` and starts the clock.
    #[must_use]
    pub fn start(pipeline: &str, stage_name: &str) -> Self {
        let span = info_span!(
            "stage",
            pipeline = %pipeline,
            stage = %stage_name,
            duration_ms = field::Empty
        );
        Self {
            span,
            started: Instant::now(),
        }
    }

    /// The span to instrument the stage call with.
    #[must_use]
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    /// Milliseconds since [`start`](Self::start).
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Records the duration on the span and returns it.
    #[must_use]
    pub fn finish(self) -> f64 {
        let duration_ms = self.elapsed_ms();
        self.span.record("duration_ms", duration_ms);
        debug!(parent: &self.span, duration_ms, "Stage timed");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer_measures_stage() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let timer = SpanTimer::start("review", "analyze");
            let span = timer.span();
            assert_eq!(span.metadata().map(|m| m.name()), Some("stage"));
            assert!(span.field("duration_ms").is_some());

            std::thread::sleep(std::time::Duration::from_millis(10));
            assert!(timer.finish() >= 10.0);
        });
    }
}
