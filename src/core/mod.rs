//! Core domain types - state, steps, and configuration

pub mod config;
pub mod state;
pub mod step;

pub use config::{PipelineConfig, RecoveryConfig, StepConfig};
pub use state::{
    RunOutcome, RunStatus, State, StepPhase, ERROR_MESSAGE, ERROR_TYPE, FAILED_STEP,
    RECOVERY_ATTEMPTED, RECOVERY_META,
};
pub use step::{FnStep, Step, StepError, StepRegistry};
