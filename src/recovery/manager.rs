//! Recovery manager - turns a step failure into a control-flow decision

use crate::core::{State, StepError};
use crate::recovery::checkpoint::CheckpointStore;
use crate::recovery::classify::{DefaultClassifier, ErrorCategory, ErrorClassifier};
use crate::recovery::policy::{RecoveryMode, RecoveryPolicy};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Decision returned to the executor after a failure.
///
/// `Retry` carries the backoff delay so the executor can await it with a
/// cancellable timer; the manager itself never sleeps.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    Abort,
    Retry { delay: Duration },
    Rollback,
    Skip,
    Substitute,
    Partial,
}

impl RecoveryAction {
    /// The mode this action corresponds to (what `recovery_attempted` records)
    pub fn mode(&self) -> RecoveryMode {
        match self {
            RecoveryAction::Abort => RecoveryMode::Abort,
            RecoveryAction::Retry { .. } => RecoveryMode::Retry,
            RecoveryAction::Rollback => RecoveryMode::Rollback,
            RecoveryAction::Skip => RecoveryMode::Skip,
            RecoveryAction::Substitute => RecoveryMode::Substitute,
            RecoveryAction::Partial => RecoveryMode::Partial,
        }
    }
}

/// Owns the checkpoint store, classifier, and per-run retry counters.
///
/// One instance per run; never shared between concurrent executors.
pub struct RecoveryManager {
    checkpoints: CheckpointStore,
    classifier: Box<dyn ErrorClassifier>,
    retries: HashMap<String, u32>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::with_classifier(Box::new(DefaultClassifier::new()))
    }

    pub fn with_classifier(classifier: Box<dyn ErrorClassifier>) -> Self {
        Self {
            checkpoints: CheckpointStore::new(),
            classifier,
            retries: HashMap::new(),
        }
    }

    pub fn with_checkpoint_store(mut self, checkpoints: CheckpointStore) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn checkpoints_mut(&mut self) -> &mut CheckpointStore {
        &mut self.checkpoints
    }

    /// Current attempt count for a step (0 before its first retry)
    pub fn retry_count(&self, step_name: &str) -> u32 {
        self.retries.get(step_name).copied().unwrap_or(0)
    }

    /// Reset one step's counter; called at the start of each step in a run
    pub fn reset_retries(&mut self, step_name: &str) {
        self.retries.remove(step_name);
    }

    /// Drop every counter; resumption starts a fresh retry scope
    pub fn clear_retries(&mut self) {
        self.retries.clear();
    }

    /// Decide how execution continues after `step_name` failed with `error`.
    ///
    /// Never fails for expected failures: every path returns a decision plus a
    /// state annotated with `error_type`, `error_message`, `failed_step`, and
    /// `recovery_attempted`. Decision order: custom handler, category
    /// pre-filter, then the policy mode's own eligibility logic.
    pub fn handle_error(
        &mut self,
        error: &StepError,
        state: State,
        step_name: &str,
        policy: &RecoveryPolicy,
    ) -> (RecoveryAction, State) {
        let category = self.classifier.classify(error, &state, step_name);
        let message = error.to_string();
        debug!(
            "Step {} failed ({}): {} - policy mode {:?}",
            step_name, category, message, policy.mode
        );

        if let Some(handler) = &policy.handler {
            if let Some((mode, handled_state)) = handler(error, &state, step_name) {
                info!("Custom handler decided {} for step {}", mode, step_name);
                let action = self.action_for_handler_mode(mode, step_name, policy);
                let mut out = handled_state;
                out.annotate_failure(category.label(), &message, step_name, &mode.to_string());
                return (action, out);
            }
        }

        // A category match forces the policy's mode, which is exactly what
        // dispatch applies anyway; the retry cap and the rollback-target
        // requirement hold either way, so a match only changes the log.
        if policy.matches_category(category, &message) {
            debug!(
                "Category {} matched policy filter for step {}; applying {} directly",
                category, step_name, policy.mode
            );
        }

        let (action, mut out) = self.dispatch(policy.mode, error, state, step_name, policy);
        out.annotate_failure(
            category.label(),
            &message,
            step_name,
            &action.mode().to_string(),
        );
        (action, out)
    }

    /// A custom handler's decision wins outright, but a Retry it requests
    /// still goes through the counter so the backoff delay is consistent.
    fn action_for_handler_mode(
        &mut self,
        mode: RecoveryMode,
        step_name: &str,
        policy: &RecoveryPolicy,
    ) -> RecoveryAction {
        match mode {
            RecoveryMode::Retry => {
                let delay = self.next_backoff(step_name, policy);
                RecoveryAction::Retry { delay }
            }
            RecoveryMode::Abort => RecoveryAction::Abort,
            RecoveryMode::Rollback => RecoveryAction::Rollback,
            RecoveryMode::Skip => RecoveryAction::Skip,
            RecoveryMode::Substitute => RecoveryAction::Substitute,
            RecoveryMode::Partial => RecoveryAction::Partial,
        }
    }

    fn dispatch(
        &mut self,
        mode: RecoveryMode,
        error: &StepError,
        state: State,
        step_name: &str,
        policy: &RecoveryPolicy,
    ) -> (RecoveryAction, State) {
        match mode {
            RecoveryMode::Retry => {
                // The retry cap holds even for category-forced decisions:
                // the counter must not exceed max_retries before a terminal
                // decision.
                let count = self.retry_count(step_name);
                if count >= policy.max_retries {
                    warn!(
                        "Step {} exhausted {} retries; aborting",
                        step_name, policy.max_retries
                    );
                    return (RecoveryAction::Abort, state);
                }
                let delay = self.next_backoff(step_name, policy);
                info!(
                    "Retrying step {} (attempt {} of {}) after {:?}",
                    step_name,
                    self.retry_count(step_name),
                    policy.max_retries,
                    delay
                );
                (RecoveryAction::Retry { delay }, state)
            }

            RecoveryMode::Rollback => match policy.rollback_checkpoint {
                Some(id) => match self.checkpoints.rollback_to_checkpoint(id, &state) {
                    Ok(restored) => {
                        info!("Step {} rolled back to checkpoint {}", step_name, id);
                        (RecoveryAction::Rollback, restored)
                    }
                    Err(e) => {
                        warn!("Rollback for step {} failed: {}; aborting", step_name, e);
                        (RecoveryAction::Abort, state)
                    }
                },
                None => {
                    warn!(
                        "Step {} has rollback policy but no checkpoint configured; aborting",
                        step_name
                    );
                    (RecoveryAction::Abort, state)
                }
            },

            RecoveryMode::Skip => {
                info!("Skipping failed step {}", step_name);
                (RecoveryAction::Skip, state)
            }

            RecoveryMode::Substitute => {
                let substituted = match &policy.fallback {
                    Some(fallback) => fallback(&state, step_name, error),
                    None => Self::synthesize_fallback(&state, step_name),
                };
                info!("Substituted fallback output for step {}", step_name);
                (RecoveryAction::Substitute, substituted)
            }

            RecoveryMode::Abort => (RecoveryAction::Abort, state),

            RecoveryMode::Partial => {
                info!("Step {} failed; reporting partial completion", step_name);
                (RecoveryAction::Partial, state)
            }
        }
    }

    /// Increment the counter and compute `backoff_factor ^ (retries - 1)` seconds.
    ///
    /// A factor that yields a negative, non-finite, or overflowing delay maps
    /// to zero; the config layer rejects such factors up front.
    fn next_backoff(&mut self, step_name: &str, policy: &RecoveryPolicy) -> Duration {
        let count = self.retries.entry(step_name.to_string()).or_insert(0);
        *count += 1;
        let exponent = count.saturating_sub(1) as i32;
        Duration::try_from_secs_f64(policy.backoff_factor.powi(exponent))
            .unwrap_or(Duration::ZERO)
    }

    /// Generic fallback when a Substitute policy has no fallback function:
    /// keyword-match the step name and stamp the audit flag.
    fn synthesize_fallback(state: &State, step_name: &str) -> State {
        let mut fallback = state.clone();

        if step_name.starts_with("validate") {
            fallback.insert("validation_results", serde_json::json!({"valid": false}));
        } else if step_name.starts_with("process") {
            fallback.insert("processing_complete", true);
        } else if step_name.starts_with("execute") {
            fallback.insert("execution_complete", true);
            fallback.insert("result", "stub");
        }

        fallback.set_recovery_flag("fallback_applied", true);
        fallback
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
