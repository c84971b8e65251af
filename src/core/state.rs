//! Pipeline state - the mutable data threaded through every step

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reserved key: error category of the most recent failure.
pub const ERROR_TYPE: &str = "error_type";
/// Reserved key: message of the most recent failure.
pub const ERROR_MESSAGE: &str = "error_message";
/// Reserved key: name of the step that raised the most recent failure.
pub const FAILED_STEP: &str = "failed_step";
/// Reserved key: recovery mode applied to the most recent failure.
pub const RECOVERY_ATTEMPTED: &str = "recovery_attempted";
/// Reserved key: nested object holding recovery audit flags.
pub const RECOVERY_META: &str = "_recovery";

/// Opaque, ordered, string-keyed state container.
///
/// Steps consume and produce `State`; the engine only touches the reserved
/// diagnostic keys above. `Clone` is a structural deep copy, so a checkpoint
/// snapshot never aliases the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    fields: Map<String, Value>,
}

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Get a field by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Remove a field, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Check whether a field is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Get a string field, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Stamp the reserved diagnostic fields for a failure.
    pub fn annotate_failure(
        &mut self,
        error_type: &str,
        error_message: &str,
        failed_step: &str,
        recovery_attempted: &str,
    ) {
        self.insert(ERROR_TYPE, error_type);
        self.insert(ERROR_MESSAGE, error_message);
        self.insert(FAILED_STEP, failed_step);
        self.insert(RECOVERY_ATTEMPTED, recovery_attempted);
    }

    /// Remove the reserved diagnostic fields.
    ///
    /// Called when a step ultimately succeeds, so later steps do not observe
    /// stale metadata from an earlier failed attempt. The `_recovery` audit
    /// object is left in place.
    pub fn clear_failure_annotations(&mut self) {
        self.fields.remove(ERROR_TYPE);
        self.fields.remove(ERROR_MESSAGE);
        self.fields.remove(FAILED_STEP);
        self.fields.remove(RECOVERY_ATTEMPTED);
    }

    /// Set a flag inside the nested `_recovery` object, creating it if needed.
    pub fn set_recovery_flag(&mut self, key: &str, value: impl Into<Value>) {
        let meta = self
            .fields
            .entry(RECOVERY_META.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = meta {
            map.insert(key.to_string(), value.into());
        }
    }

    /// Read a flag from the nested `_recovery` object
    pub fn recovery_flag(&self, key: &str) -> Option<&Value> {
        self.fields
            .get(RECOVERY_META)
            .and_then(Value::as_object)
            .and_then(|m| m.get(key))
    }

    /// Whether `_recovery.partial_execution` is truthy
    pub fn partial_execution(&self) -> bool {
        is_truthy(self.recovery_flag("partial_execution"))
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Map<String, Value>> for State {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Phase of a single step within the driver loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    /// Step has not been attempted yet
    Pending,
    /// Step is currently being attempted
    Running,
    /// Step completed without error
    Succeeded,
    /// Step raised an error; a recovery decision is pending
    Failed,
    /// A recovery outcome (rollback/skip/substitute) let the run advance
    Recovered,
    /// The run stopped at this step
    Aborted,
}

impl StepPhase {
    /// Check if the phase is terminal for a step
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepPhase::Succeeded | StepPhase::Recovered | StepPhase::Aborted
        )
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every step reached Succeeded or Recovered
    Completed,
    /// A step failure ended the run (or it was cancelled)
    Aborted,
    /// A Partial recovery outcome stopped the run cleanly
    Partial,
}

/// Result of one pipeline run.
///
/// Expected failures never surface as `Err`; callers inspect `status` (and the
/// reserved state fields) instead of catching errors.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Unique id for this run
    pub execution_id: Uuid,

    /// How the run ended
    pub status: RunStatus,

    /// Final state, including any diagnostic annotations
    pub state: State,
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        self.status == RunStatus::Aborted
    }

    /// Completed and Partial both count as a non-error return
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Partial)
    }
}
