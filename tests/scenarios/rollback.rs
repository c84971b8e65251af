//! Test: Rollback to a configured checkpoint

use crate::helpers::*;
use pipewright::core::{RunStatus, State, StepRegistry};
use pipewright::recovery::{PolicySet, RecoveryMode, RecoveryPolicy};
use serde_json::json;

/// After a failure under a Rollback policy, the run continues from the
/// checkpoint's snapshot plus the engine's error annotations.
#[tokio::test]
async fn test_rollback_restores_checkpoint_and_continues() {
    let mut registry = StepRegistry::new();
    registry.register_fn("transform", |mut state: State| {
        state.insert("transformed", true);
        Ok(state)
    });
    register_failing_step(&mut registry, "risky", AttemptCounter::new());
    // The step after the rollback sees the snapshot plus error annotations
    registry.register_fn("report", |mut state: State| {
        if let Some(error_type) = state.get_str("error_type").map(str::to_string) {
            state.insert("observed_error_type", error_type);
        }
        state.insert("report_output", "report ran");
        Ok(state)
    });

    let mut initial = State::new();
    initial.insert("loaded", json!({"rows": 42}));

    // Snapshot the known-good state before the run, reference it in the policy
    let mut executor = executor_with(PolicySet::new());
    let checkpoint = executor
        .recovery_mut()
        .checkpoints_mut()
        .create_checkpoint(&initial, "known good");

    let policies = PolicySet::new().with_policy(
        "risky",
        RecoveryPolicy::new(RecoveryMode::Rollback).with_rollback_to(checkpoint),
    );
    let mut executor = executor.with_policies(policies);

    let outcome = executor.run(&registry, initial).await;

    assert_eq!(outcome.status, RunStatus::Completed);

    // State reverted to the snapshot: transform's mutation is gone
    assert!(!outcome.state.contains_key("transformed"));
    assert_eq!(outcome.state.get("loaded"), Some(&json!({"rows": 42})));

    // The run continued to the next step, which saw the annotations
    assert!(outcome.state.contains_key("report_output"));
    assert_eq!(
        outcome.state.get_str("observed_error_type"),
        Some("EXECUTION")
    );
}

/// Rollback mode without a configured checkpoint aborts.
#[tokio::test]
async fn test_rollback_without_checkpoint_aborts() {
    let mut registry = StepRegistry::new();
    register_failing_step(&mut registry, "risky", AttemptCounter::new());
    register_marker_step(&mut registry, "after");

    let policies =
        PolicySet::new().with_policy("risky", RecoveryPolicy::new(RecoveryMode::Rollback));
    let mut executor = executor_with(policies);
    let outcome = executor.run(&registry, State::new()).await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert!(!outcome.state.contains_key("after_output"));
}
