//! Test utility functions for pipewright scenario tests

use pipewright::core::{State, StepError, StepRegistry};
use pipewright::execution::{PipelineExecutor, TraceMetadata, TraceSink};
use pipewright::recovery::{PolicySet, RecoveryManager};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Executor over a fresh recovery manager
pub fn executor_with(policies: PolicySet) -> PipelineExecutor {
    PipelineExecutor::new(RecoveryManager::new(), policies)
}

/// Shared attempt counter for fallible steps
#[derive(Clone, Default)]
pub struct AttemptCounter(Arc<AtomicUsize>);

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Record one attempt; returns the previous count
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Register a step that records its output under its own name
pub fn register_marker_step(registry: &mut StepRegistry, name: &'static str) {
    registry.register_fn(name, move |mut state: State| {
        state.insert(format!("{}_output", name), format!("{} ran", name));
        Ok(state)
    });
}

/// Register a step that always fails with an execution error
pub fn register_failing_step(
    registry: &mut StepRegistry,
    name: &'static str,
    counter: AttemptCounter,
) {
    registry.register_fn(name, move |_: State| {
        counter.bump();
        Err::<State, _>(StepError::Execution(format!("{} exploded", name)))
    });
}

/// Register a step that fails `failures` times, then succeeds
pub fn register_flaky_step(
    registry: &mut StepRegistry,
    name: &'static str,
    failures: usize,
    counter: AttemptCounter,
) {
    registry.register_fn(name, move |mut state: State| {
        let attempt = counter.bump();
        if attempt < failures {
            Err(StepError::Timeout(format!(
                "{} attempt {} timed out",
                name,
                attempt + 1
            )))
        } else {
            state.insert(format!("{}_output", name), format!("{} ran", name));
            Ok(state)
        }
    });
}

/// A recorded trace call
#[derive(Debug, Clone)]
pub struct TraceCall {
    pub step_name: String,
    pub is_input: bool,
    pub success: bool,
    pub retry_count: u32,
}

/// Trace sink that records every call for assertions
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<TraceCall>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<TraceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Output records for one step
    pub fn attempts_for(&self, step_name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.step_name == step_name && !c.is_input)
            .count()
    }
}

impl TraceSink for RecordingSink {
    fn record(
        &self,
        step_name: &str,
        _snapshot: &State,
        is_input: bool,
        metadata: &TraceMetadata,
    ) -> Result<(), pipewright::execution::TraceError> {
        self.calls.lock().unwrap().push(TraceCall {
            step_name: step_name.to_string(),
            is_input,
            success: metadata.success,
            retry_count: metadata.retry_count,
        });
        Ok(())
    }
}

/// Trace sink that always fails; runs must shrug it off
pub struct FailingSink;

impl TraceSink for FailingSink {
    fn record(
        &self,
        _step_name: &str,
        _snapshot: &State,
        _is_input: bool,
        _metadata: &TraceMetadata,
    ) -> Result<(), pipewright::execution::TraceError> {
        Err(pipewright::execution::TraceError::Sink(
            "sink is down".to_string(),
        ))
    }
}
