//! Step trait and registry - the pluggable units of work

use crate::core::State;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a step.
///
/// The variants give the classifier a type-level hint; anything opaque goes
/// through `Other` and is bucketed by message heuristics instead.
#[derive(Debug, Error)]
pub enum StepError {
    /// State failed a validation the step performs
    #[error("validation failed: {0}")]
    Validation(String),

    /// A remote API or service call failed
    #[error("api call failed: {0}")]
    Api(String),

    /// The step lacked permission for an operation
    #[error("permission denied: {0}")]
    Permission(String),

    /// A resource (file, connection, quota) was unavailable
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// The step ran out of time
    #[error("timed out: {0}")]
    Timeout(String),

    /// The step's own work failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A named unit of work consuming and producing [`State`].
///
/// Implementations may fail with any [`StepError`]; the executor converts the
/// error into a recovery decision at the invocation boundary, so errors from
/// here never propagate past the engine.
#[async_trait]
pub trait Step: Send + Sync {
    /// Step name, unique within a registry
    fn name(&self) -> &str;

    /// Run the step over the current state
    async fn run(&self, state: State) -> Result<State, StepError>;
}

/// Adapter turning a plain closure into a [`Step`].
pub struct FnStep {
    name: String,
    func: Box<dyn Fn(State) -> Result<State, StepError> + Send + Sync>,
}

impl FnStep {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(State) -> Result<State, StepError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: State) -> Result<State, StepError> {
        (self.func)(state)
    }
}

/// Ordered collection of steps making up one pipeline.
#[derive(Default)]
pub struct StepRegistry {
    steps: Vec<Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step, preserving registration order
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.push(step);
    }

    /// Convenience: register a closure as a step
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(State) -> Result<State, StepError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnStep::new(name, func)));
    }

    /// Look up a step by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Position of a step in execution order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }

    /// Step at a given position
    pub fn step_at(&self, index: usize) -> Option<&Arc<dyn Step>> {
        self.steps.get(index)
    }

    /// Step names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
