//! Test: Retry with exponential backoff

use crate::helpers::*;
use pipewright::core::{RunStatus, State, StepRegistry};
use pipewright::recovery::{PolicySet, RecoveryMode, RecoveryPolicy};
use std::time::Duration;
use tokio::time::Instant;

/// A step that fails N times then succeeds is attempted exactly N+1 times,
/// and the total backoff is the geometric sum of the factor.
#[tokio::test(start_paused = true)]
async fn test_retry_convergence_and_backoff_sum() {
    let mut registry = StepRegistry::new();
    let attempts = AttemptCounter::new();
    register_flaky_step(&mut registry, "ingest", 3, attempts.clone());

    let policies = PolicySet::new().with_policy(
        "ingest",
        RecoveryPolicy::new(RecoveryMode::Retry)
            .with_max_retries(3)
            .with_backoff_factor(2.0),
    );

    let sink = RecordingSink::new();
    let mut executor = executor_with(policies).with_trace_sink(sink.clone());

    let started = Instant::now();
    let outcome = executor.run(&registry, State::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(attempts.count(), 4);
    assert_eq!(sink.attempts_for("ingest"), 4);

    // Backoff delays: 2^0 + 2^1 + 2^2 = 7s under the paused clock
    assert!(elapsed >= Duration::from_secs(7), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);
}

/// Exhausting max_retries turns the final decision into Abort.
#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_aborts() {
    let mut registry = StepRegistry::new();
    let attempts = AttemptCounter::new();
    register_failing_step(&mut registry, "doomed", attempts.clone());
    register_marker_step(&mut registry, "after");

    let policies = PolicySet::new().with_policy(
        "doomed",
        RecoveryPolicy::new(RecoveryMode::Retry)
            .with_max_retries(2)
            .with_backoff_factor(2.0),
    );

    let mut executor = executor_with(policies);
    let outcome = executor.run(&registry, State::new()).await;

    // Initial attempt + 2 retries
    assert_eq!(attempts.count(), 3);
    assert_eq!(outcome.status, RunStatus::Aborted);
    assert!(!outcome.state.contains_key("after_output"));
    assert_eq!(outcome.state.get_str("recovery_attempted"), Some("Abort"));
}

/// End-to-end: [a, b, c] where b fails twice then succeeds with
/// max_retries=2, backoff_factor=2.0. Delays are 1s then 2s, and the final
/// state holds all three outputs.
#[tokio::test(start_paused = true)]
async fn test_three_step_pipeline_with_flaky_middle() {
    let mut registry = StepRegistry::new();
    register_marker_step(&mut registry, "a");
    let attempts = AttemptCounter::new();
    register_flaky_step(&mut registry, "b", 2, attempts.clone());
    register_marker_step(&mut registry, "c");

    let policies = PolicySet::new().with_policy(
        "b",
        RecoveryPolicy::new(RecoveryMode::Retry)
            .with_max_retries(2)
            .with_backoff_factor(2.0),
    );

    let mut executor = executor_with(policies);
    let started = Instant::now();
    let outcome = executor.run(&registry, State::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(attempts.count(), 3);

    // 1.0s + 2.0s of backoff before the third attempt succeeds
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);

    assert!(outcome.state.contains_key("a_output"));
    assert!(outcome.state.contains_key("b_output"));
    assert!(outcome.state.contains_key("c_output"));

    // The eventual success wiped the transient failure metadata
    assert!(!outcome.state.contains_key("error_type"));
    assert!(!outcome.state.contains_key("recovery_attempted"));
}
