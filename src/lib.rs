//! pipewright - a resilient pipeline runner with checkpointing and
//! per-step recovery policies

pub mod cli;
pub mod core;
pub mod execution;
pub mod recovery;

// Re-export commonly used types
pub use crate::core::{
    FnStep, PipelineConfig, RunOutcome, RunStatus, State, Step, StepError, StepPhase, StepRegistry,
};
pub use execution::{
    verify_safe_resumption, CancelToken, EngineError, LogTraceSink, NoopTraceSink, PipelineExecutor,
    TraceMetadata, TraceSink,
};
pub use recovery::{
    CheckpointId, CheckpointStore, ErrorCategory, ErrorClassifier, PolicySet, RecoveryManager,
    RecoveryMode, RecoveryPolicy,
};
