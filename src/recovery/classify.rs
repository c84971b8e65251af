//! Error classification - buckets step failures into a fixed category set

use crate::core::{State, StepError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of failure categories the recovery policies filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Execution,
    StateValidation,
    ApiIntegration,
    Permission,
    Resource,
    Timeout,
    Unexpected,
}

impl ErrorCategory {
    /// Canonical label, as stored in `error_type`
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Execution => "EXECUTION",
            ErrorCategory::StateValidation => "STATE_VALIDATION",
            ErrorCategory::ApiIntegration => "API_INTEGRATION",
            ErrorCategory::Permission => "PERMISSION",
            ErrorCategory::Resource => "RESOURCE",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Unexpected => "UNEXPECTED",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EXECUTION" => Ok(ErrorCategory::Execution),
            "STATE_VALIDATION" => Ok(ErrorCategory::StateValidation),
            "API_INTEGRATION" => Ok(ErrorCategory::ApiIntegration),
            "PERMISSION" => Ok(ErrorCategory::Permission),
            "RESOURCE" => Ok(ErrorCategory::Resource),
            "TIMEOUT" => Ok(ErrorCategory::Timeout),
            "UNEXPECTED" => Ok(ErrorCategory::Unexpected),
            other => Err(format!("unknown error category: {}", other)),
        }
    }
}

/// Maps a step failure to a category. Must not fail.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &StepError, state: &State, step_name: &str) -> ErrorCategory;
}

/// Default heuristic classifier.
///
/// Typed `StepError` variants map directly; opaque errors fall through to a
/// set of message-pattern rules, then to `Unexpected`.
pub struct DefaultClassifier {
    rules: Vec<(Regex, ErrorCategory)>,
}

impl DefaultClassifier {
    pub fn new() -> Self {
        let patterns = [
            (r"(?i)timed?\s*out|deadline", ErrorCategory::Timeout),
            (r"(?i)permission|denied|forbidden|unauthorized", ErrorCategory::Permission),
            (r"(?i)connection|api|http|status\s*\d{3}|rate.?limit", ErrorCategory::ApiIntegration),
            (r"(?i)memory|disk|quota|resource|exhausted|unavailable", ErrorCategory::Resource),
            (r"(?i)invalid|schema|missing\s+(key|field)|validat", ErrorCategory::StateValidation),
            (r"(?i)fail|error|panic", ErrorCategory::Execution),
        ];

        let rules = patterns
            .into_iter()
            .filter_map(|(pattern, category)| Regex::new(pattern).ok().map(|re| (re, category)))
            .collect();

        Self { rules }
    }
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &StepError, _state: &State, _step_name: &str) -> ErrorCategory {
        match error {
            StepError::Validation(_) => ErrorCategory::StateValidation,
            StepError::Api(_) => ErrorCategory::ApiIntegration,
            StepError::Permission(_) => ErrorCategory::Permission,
            StepError::Resource(_) => ErrorCategory::Resource,
            StepError::Timeout(_) => ErrorCategory::Timeout,
            StepError::Execution(_) => ErrorCategory::Execution,
            StepError::Other(err) => {
                let message = err.to_string();
                self.rules
                    .iter()
                    .find(|(re, _)| re.is_match(&message))
                    .map(|(_, category)| *category)
                    .unwrap_or(ErrorCategory::Unexpected)
            }
        }
    }
}
