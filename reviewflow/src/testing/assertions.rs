//! Test assertions for pipeline runs.

use super::{RecordingObserver, TraceContext};

/// Asserts that the context's trail equals `expected`.
pub fn assert_trail(context: &TraceContext, expected: &[&str]) {
    assert_eq!(
        context.trail(),
        expected,
        "Expected trail {:?}, got {:?}",
        expected,
        context.trail
    );
}

/// Asserts that the observer saw exactly `expected`, in order.
pub fn assert_hook_calls(observer: &RecordingObserver, expected: &[&str]) {
    let calls = observer.calls();
    let actual: Vec<&str> = calls.iter().map(String::as_str).collect();
    assert_eq!(
        actual, expected,
        "Expected hook calls {:?}, got {:?}",
        expected, actual
    );
}
