//! Test: Resuming a pipeline at an arbitrary step

use crate::helpers::*;
use pipewright::core::{RunStatus, State, StepRegistry};
use pipewright::execution::{verify_safe_resumption, EngineError};
use pipewright::recovery::{PolicySet, RecoveryMode, RecoveryPolicy};
use serde_json::json;

/// Resuming from an unknown step fails fast and executes nothing.
#[tokio::test]
async fn test_resume_from_unknown_step_fails_fast() {
    let mut registry = StepRegistry::new();
    let attempts = AttemptCounter::new();
    register_flaky_step(&mut registry, "real", 0, attempts.clone());

    let mut executor = executor_with(PolicySet::new());
    let result = executor
        .resume_from(&registry, State::new(), "imaginary")
        .await;

    assert!(matches!(
        result,
        Err(EngineError::StepNotFound(name)) if name == "imaginary"
    ));
    assert_eq!(attempts.count(), 0);
}

/// A resumed run only executes the suffix, over the supplied state.
#[tokio::test]
async fn test_resume_runs_suffix_with_supplied_state() {
    let mut registry = StepRegistry::new();
    register_marker_step(&mut registry, "extract");
    register_marker_step(&mut registry, "transform");
    register_marker_step(&mut registry, "load");

    // State as if extract had completed in a previous run
    let mut supplied = State::new();
    supplied.insert("extract_output", "extract ran");
    supplied.insert("rows", json!(10));

    let mut executor = executor_with(PolicySet::new());
    let outcome = executor
        .resume_from(&registry, supplied, "transform")
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.state.contains_key("transform_output"));
    assert!(outcome.state.contains_key("load_output"));
    assert_eq!(outcome.state.get("rows"), Some(&json!(10)));
}

/// Resumption starts a fresh retry scope: a step that burned its retries in
/// one run gets its full budget again after resuming.
#[tokio::test(start_paused = true)]
async fn test_resume_resets_retry_scope() {
    let mut registry = StepRegistry::new();
    let attempts = AttemptCounter::new();
    register_failing_step(&mut registry, "wobbly", attempts.clone());

    let policies = PolicySet::new().with_policy(
        "wobbly",
        RecoveryPolicy::new(RecoveryMode::Retry)
            .with_max_retries(1)
            .with_backoff_factor(1.0),
    );

    let mut executor = executor_with(policies);

    let first = executor.run(&registry, State::new()).await;
    assert_eq!(first.status, RunStatus::Aborted);
    assert_eq!(attempts.count(), 2);

    let second = executor
        .resume_from(&registry, State::new(), "wobbly")
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Aborted);
    // Full budget again: initial attempt + 1 retry
    assert_eq!(attempts.count(), 4);
}

/// The advisory safety check flags missing keys and partial executions.
#[tokio::test]
async fn test_verify_safe_resumption_gates_partial_state() {
    let mut registry = StepRegistry::new();
    register_marker_step(&mut registry, "a");
    register_failing_step(&mut registry, "b", AttemptCounter::new());
    register_marker_step(&mut registry, "c");

    let policies = PolicySet::new().with_policy("b", RecoveryPolicy::new(RecoveryMode::Partial));
    let mut executor = executor_with(policies);
    let outcome = executor.run(&registry, State::new()).await;
    assert_eq!(outcome.status, RunStatus::Partial);

    // A partial execution is not safe to resume blindly
    assert!(!verify_safe_resumption(&outcome.state, &["a_output"]));

    // Clean state with the required keys is
    let mut clean = State::new();
    clean.insert("a_output", "a ran");
    assert!(verify_safe_resumption(&clean, &["a_output"]));
    assert!(!verify_safe_resumption(&clean, &["a_output", "b_output"]));
}
