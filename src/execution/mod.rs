//! Pipeline execution - invocation boundary, trace sink, and the driver

pub mod engine;
pub mod executor;
pub mod trace;

pub use engine::{verify_safe_resumption, CancelToken, EngineError, PipelineExecutor};
pub use executor::{invoke_step, StepOutcome};
pub use trace::{LogTraceSink, NoopTraceSink, TraceError, TraceMetadata, TraceSink};
