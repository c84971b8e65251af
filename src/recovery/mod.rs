//! Failure recovery - checkpoints, policies, classification, and decisions

pub mod checkpoint;
pub mod classify;
pub mod manager;
pub mod policy;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointId, CheckpointStore};
pub use classify::{DefaultClassifier, ErrorCategory, ErrorClassifier};
pub use manager::{RecoveryAction, RecoveryManager};
pub use policy::{CustomHandler, FallbackFn, PolicySet, RecoveryMode, RecoveryPolicy};
