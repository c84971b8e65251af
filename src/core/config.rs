//! Pipeline configuration from YAML

use crate::core::State;
use crate::recovery::{ErrorCategory, PolicySet, RecoveryMode, RecoveryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("step {step}: {problem}")]
    Invalid { step: String, problem: String },
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Initial state fields, available to the first step
    #[serde(default)]
    pub initial_state: serde_json::Map<String, serde_json::Value>,

    /// Recovery applied to steps without their own block
    #[serde(default)]
    pub default_recovery: Option<RecoveryConfig>,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step name
    pub name: String,

    /// Shell command the step runs
    pub command: String,

    /// Recovery for this step (overrides the pipeline default)
    #[serde(default)]
    pub recovery: Option<RecoveryConfig>,
}

/// Recovery block as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// abort | retry | rollback | skip | substitute | partial
    pub mode: RecoveryMode,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub backoff_factor: Option<f64>,

    /// Category labels that force this mode regardless of eligibility
    #[serde(default)]
    pub error_categories: Vec<String>,
}

impl RecoveryConfig {
    fn to_policy(&self, step: &str) -> Result<RecoveryPolicy, ConfigError> {
        let mut policy = RecoveryPolicy::new(self.mode);
        if let Some(max_retries) = self.max_retries {
            policy = policy.with_max_retries(max_retries);
        }
        if let Some(backoff_factor) = self.backoff_factor {
            if !backoff_factor.is_finite() || backoff_factor < 0.0 {
                return Err(ConfigError::Invalid {
                    step: step.to_string(),
                    problem: format!(
                        "backoff_factor must be a finite non-negative number, got {}",
                        backoff_factor
                    ),
                });
            }
            policy = policy.with_backoff_factor(backoff_factor);
        }

        let mut categories = Vec::new();
        for label in &self.error_categories {
            let category: ErrorCategory =
                label.parse().map_err(|problem| ConfigError::Invalid {
                    step: step.to_string(),
                    problem,
                })?;
            categories.push(category);
        }
        Ok(policy.with_error_categories(categories))
    }
}

impl PipelineConfig {
    /// Parse a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(ConfigError::Invalid {
                    step: step.name.clone(),
                    problem: "duplicate step name".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build the policy set this configuration describes
    pub fn to_policy_set(&self) -> Result<PolicySet, ConfigError> {
        let default = match &self.default_recovery {
            Some(recovery) => recovery.to_policy("<default>")?,
            None => RecoveryPolicy::default(),
        };

        let mut policies = PolicySet::with_default(default);
        for step in &self.steps {
            if let Some(recovery) = &step.recovery {
                policies.insert(step.name.clone(), recovery.to_policy(&step.name)?);
            }
        }
        Ok(policies)
    }

    /// Initial state for a run
    pub fn to_initial_state(&self) -> State {
        State::from(self.initial_state.clone())
    }
}
