//! Recovery policies - the declarative response to a step's failure

use crate::core::{State, StepError};
use crate::recovery::checkpoint::CheckpointId;
use crate::recovery::classify::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Response strategy applied when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Stop the run immediately (the default)
    Abort,
    /// Re-attempt the step with exponential backoff
    Retry,
    /// Restore a configured checkpoint and continue with the next step
    Rollback,
    /// Discard the step's effects and continue with the next step
    Skip,
    /// Replace the step's output with a fallback state and continue
    Substitute,
    /// Stop advancing but report the run as cleanly (partially) finished
    Partial,
}

impl Default for RecoveryMode {
    fn default() -> Self {
        RecoveryMode::Abort
    }
}

impl fmt::Display for RecoveryMode {
    /// Variant name as stored in the `recovery_attempted` state field
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryMode::Abort => "Abort",
            RecoveryMode::Retry => "Retry",
            RecoveryMode::Rollback => "Rollback",
            RecoveryMode::Skip => "Skip",
            RecoveryMode::Substitute => "Substitute",
            RecoveryMode::Partial => "Partial",
        };
        f.write_str(name)
    }
}

/// Produces a replacement state when a Substitute policy fires.
pub type FallbackFn = Arc<dyn Fn(&State, &str, &StepError) -> State + Send + Sync>;

/// Caller-supplied override consulted before any other recovery logic.
/// Returning `None` falls through to the normal decision path.
pub type CustomHandler =
    Arc<dyn Fn(&StepError, &State, &str) -> Option<(RecoveryMode, State)> + Send + Sync>;

/// Per-step recovery configuration. Immutable during a run.
#[derive(Clone)]
pub struct RecoveryPolicy {
    pub mode: RecoveryMode,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub rollback_checkpoint: Option<CheckpointId>,
    pub error_categories: HashSet<ErrorCategory>,
    pub fallback: Option<FallbackFn>,
    pub handler: Option<CustomHandler>,
}

impl RecoveryPolicy {
    pub fn new(mode: RecoveryMode) -> Self {
        Self {
            mode,
            max_retries: 3,
            backoff_factor: 2.0,
            rollback_checkpoint: None,
            error_categories: HashSet::new(),
            fallback: None,
            handler: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_rollback_to(mut self, checkpoint: CheckpointId) -> Self {
        self.rollback_checkpoint = Some(checkpoint);
        self
    }

    pub fn with_error_categories(
        mut self,
        categories: impl IntoIterator<Item = ErrorCategory>,
    ) -> Self {
        self.error_categories = categories.into_iter().collect();
        self
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&State, &str, &StepError) -> State + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StepError, &State, &str) -> Option<(RecoveryMode, State)> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Category pre-filter: matches when the classified category is
    /// configured, or when any configured category's name appears
    /// (case-insensitively) inside the raw error message.
    pub fn matches_category(&self, category: ErrorCategory, error_message: &str) -> bool {
        if self.error_categories.is_empty() {
            return false;
        }
        if self.error_categories.contains(&category) {
            return true;
        }
        let message = error_message.to_ascii_lowercase();
        self.error_categories
            .iter()
            .any(|c| message.contains(&c.label().to_ascii_lowercase()))
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(RecoveryMode::Abort)
    }
}

impl fmt::Debug for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPolicy")
            .field("mode", &self.mode)
            .field("max_retries", &self.max_retries)
            .field("backoff_factor", &self.backoff_factor)
            .field("rollback_checkpoint", &self.rollback_checkpoint)
            .field("error_categories", &self.error_categories)
            .field("fallback", &self.fallback.as_ref().map(|_| "<fn>"))
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Per-step policies plus the default applied to unconfigured steps.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    per_step: HashMap<String, RecoveryPolicy>,
    default: RecoveryPolicy,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(default: RecoveryPolicy) -> Self {
        Self {
            per_step: HashMap::new(),
            default,
        }
    }

    /// Configure the policy for one step
    pub fn insert(&mut self, step_name: impl Into<String>, policy: RecoveryPolicy) {
        self.per_step.insert(step_name.into(), policy);
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with_policy(mut self, step_name: impl Into<String>, policy: RecoveryPolicy) -> Self {
        self.insert(step_name, policy);
        self
    }

    /// Effective policy for a step: its own, or the default
    pub fn effective(&self, step_name: &str) -> &RecoveryPolicy {
        self.per_step.get(step_name).unwrap_or(&self.default)
    }
}
