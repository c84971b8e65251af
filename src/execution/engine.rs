//! Pipeline executor - drives the ordered step list with recovery

use crate::core::{RunOutcome, RunStatus, State, StepPhase, StepRegistry};
use crate::execution::executor::{invoke_step, StepOutcome};
use crate::execution::trace::{NoopTraceSink, TraceMetadata, TraceSink};
use crate::recovery::{PolicySet, RecoveryAction, RecoveryManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

/// Engine-internal faults. These fail fast; expected step failures never
/// surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step not found: {0}")]
    StepNotFound(String),
}

/// Signal that can interrupt an in-progress backoff wait.
///
/// An un-interruptible sleep during retry is an availability risk, so the
/// engine races every backoff against this token and forces an Aborted
/// outcome when it fires.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; wakes any in-progress backoff wait
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // A Notified future only joins the waiter list once polled; enable()
        // registers it now, so a cancel() landing after the flag check still
        // wakes this future.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Drives an ordered step list end-to-end over a shared state.
///
/// Owns its [`RecoveryManager`] (and through it the checkpoint store and
/// retry counters); nothing is shared between concurrent executors.
pub struct PipelineExecutor {
    recovery: RecoveryManager,
    policies: PolicySet,
    trace: Arc<dyn TraceSink>,
    cancel: CancelToken,
}

impl PipelineExecutor {
    pub fn new(recovery: RecoveryManager, policies: PolicySet) -> Self {
        Self {
            recovery,
            policies,
            trace: Arc::new(NoopTraceSink),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_trace_sink(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    /// Replace the policy set, e.g. once checkpoint ids for rollback
    /// policies exist
    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The recovery manager, e.g. for creating checkpoints before a run
    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    pub fn recovery_mut(&mut self) -> &mut RecoveryManager {
        &mut self.recovery
    }

    /// Run every registered step in order over `initial`.
    ///
    /// Expected failures are encoded in the returned [`RunOutcome`]; callers
    /// inspect `status` and the reserved state fields, not an `Err`.
    pub async fn run(&mut self, registry: &StepRegistry, initial: State) -> RunOutcome {
        let execution_id = Uuid::new_v4();
        info!(
            "Starting pipeline run {} ({} steps)",
            execution_id,
            registry.len()
        );

        self.recovery
            .checkpoints_mut()
            .create_checkpoint(&initial, "Execution Start");

        self.drive(registry, initial, 0, execution_id).await
    }

    /// Re-enter the driver loop at `start_step` with externally supplied state.
    ///
    /// Fails fast with [`EngineError::StepNotFound`] before executing anything
    /// when the step is unknown. Retry counters start from a fresh scope.
    /// Callers are expected to have consulted [`verify_safe_resumption`] first.
    pub async fn resume_from(
        &mut self,
        registry: &StepRegistry,
        state: State,
        start_step: &str,
    ) -> Result<RunOutcome, EngineError> {
        let start_index = registry
            .index_of(start_step)
            .ok_or_else(|| EngineError::StepNotFound(start_step.to_string()))?;

        let execution_id = Uuid::new_v4();
        info!(
            "Resuming pipeline run {} from step {} (index {})",
            execution_id, start_step, start_index
        );

        self.recovery.clear_retries();
        self.recovery
            .checkpoints_mut()
            .create_checkpoint(&state, &format!("Resume from {}", start_step));

        Ok(self.drive(registry, state, start_index, execution_id).await)
    }

    /// The per-step driver loop shared by `run` and `resume_from`.
    async fn drive(
        &mut self,
        registry: &StepRegistry,
        mut state: State,
        start_index: usize,
        execution_id: Uuid,
    ) -> RunOutcome {
        for index in start_index..registry.len() {
            let Some(step) = registry.step_at(index).cloned() else {
                break;
            };
            let step_name = step.name().to_string();

            self.recovery.reset_retries(&step_name);
            self.recovery
                .checkpoints_mut()
                .create_checkpoint(&state, &format!("Before {}", step_name));

            let mut phase = StepPhase::Pending;
            while !phase.is_terminal() {
                if self.cancel.is_cancelled() {
                    return self.aborted_by_cancel(execution_id, state, &step_name);
                }

                phase = StepPhase::Running;
                let retry_count = self.recovery.retry_count(&step_name);
                self.record_trace(&step_name, &state, true, TraceMetadata::input(retry_count));

                let (outcome, duration) = invoke_step(step.as_ref(), &state).await;

                match outcome {
                    StepOutcome::Success(next_state) => {
                        self.record_trace(
                            &step_name,
                            &next_state,
                            false,
                            TraceMetadata::success(retry_count, duration),
                        );
                        state = next_state;
                        // A success wipes stale metadata from earlier attempts
                        state.clear_failure_annotations();
                        phase = StepPhase::Succeeded;
                    }
                    StepOutcome::Failure {
                        error,
                        state: failed_state,
                    } => {
                        self.record_trace(
                            &step_name,
                            &failed_state,
                            false,
                            TraceMetadata::failure(error.to_string(), retry_count, duration),
                        );

                        let policy = self.policies.effective(&step_name).clone();
                        let (action, annotated) =
                            self.recovery
                                .handle_error(&error, failed_state, &step_name, &policy);
                        state = annotated;

                        match action {
                            RecoveryAction::Retry { delay } => {
                                phase = StepPhase::Failed;
                                if !self.backoff(delay).await {
                                    return self.aborted_by_cancel(
                                        execution_id,
                                        state,
                                        &step_name,
                                    );
                                }
                            }
                            RecoveryAction::Rollback
                            | RecoveryAction::Skip
                            | RecoveryAction::Substitute => {
                                phase = StepPhase::Recovered;
                            }
                            RecoveryAction::Abort => {
                                info!("Run {} aborted at step {}", execution_id, step_name);
                                return RunOutcome {
                                    execution_id,
                                    status: RunStatus::Aborted,
                                    state,
                                };
                            }
                            RecoveryAction::Partial => {
                                info!(
                                    "Run {} stopped at step {} with partial completion",
                                    execution_id, step_name
                                );
                                state.set_recovery_flag("partial_execution", true);
                                return RunOutcome {
                                    execution_id,
                                    status: RunStatus::Partial,
                                    state,
                                };
                            }
                        }
                    }
                }
            }

            self.recovery
                .checkpoints_mut()
                .create_checkpoint(&state, &format!("After {}", step_name));
        }

        self.recovery
            .checkpoints_mut()
            .create_checkpoint(&state, "Execution Complete");
        info!("Run {} completed", execution_id);

        RunOutcome {
            execution_id,
            status: RunStatus::Completed,
            state,
        }
    }

    /// Wait out a retry delay; returns false when cancelled mid-wait
    async fn backoff(&self, delay: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    fn aborted_by_cancel(
        &self,
        execution_id: Uuid,
        mut state: State,
        step_name: &str,
    ) -> RunOutcome {
        warn!("Run {} cancelled during step {}", execution_id, step_name);
        state.set_recovery_flag("cancelled", true);
        RunOutcome {
            execution_id,
            status: RunStatus::Aborted,
            state,
        }
    }

    fn record_trace(&self, step_name: &str, snapshot: &State, is_input: bool, meta: TraceMetadata) {
        if let Err(e) = self.trace.record(step_name, snapshot, is_input, &meta) {
            warn!("Trace sink error for step {}: {}", step_name, e);
        }
    }
}

/// Advisory pre-resumption check.
///
/// Returns `false` iff any of `required_keys` is absent from `state`, or the
/// state is marked as a partial execution. The resumption API does not call
/// this itself; callers decide whether to honor it.
pub fn verify_safe_resumption(state: &State, required_keys: &[&str]) -> bool {
    if required_keys.iter().any(|key| !state.contains_key(key)) {
        return false;
    }
    !state.partial_execution()
}
