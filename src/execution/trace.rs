//! Trace sink - best-effort observer of every step attempt

use crate::core::State;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Metadata attached to a trace record
#[derive(Debug, Clone)]
pub struct TraceMetadata {
    /// Whether the attempt succeeded (always true for input records)
    pub success: bool,

    /// Error message when the attempt failed
    pub error: Option<String>,

    /// Retry count at the time of the attempt
    pub retry_count: u32,

    /// Wall-clock duration of the attempt (zero for input records)
    pub duration: Duration,
}

impl TraceMetadata {
    pub fn input(retry_count: u32) -> Self {
        Self {
            success: true,
            error: None,
            retry_count,
            duration: Duration::ZERO,
        }
    }

    pub fn success(retry_count: u32, duration: Duration) -> Self {
        Self {
            success: true,
            error: None,
            retry_count,
            duration,
        }
    }

    pub fn failure(error: String, retry_count: u32, duration: Duration) -> Self {
        Self {
            success: false,
            error: Some(error),
            retry_count,
            duration,
        }
    }
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace sink failed: {0}")]
    Sink(String),
}

/// Receives a snapshot of every step attempt's input and output.
///
/// Best-effort by contract: the executor logs and swallows errors from
/// `record`, so a failing sink can never abort a run.
pub trait TraceSink: Send + Sync {
    fn record(
        &self,
        step_name: &str,
        snapshot: &State,
        is_input: bool,
        metadata: &TraceMetadata,
    ) -> Result<(), TraceError>;
}

/// Sink that forwards records to the tracing subscriber
#[derive(Default)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn record(
        &self,
        step_name: &str,
        snapshot: &State,
        is_input: bool,
        metadata: &TraceMetadata,
    ) -> Result<(), TraceError> {
        let direction = if is_input { "input" } else { "output" };
        debug!(
            step = step_name,
            direction,
            success = metadata.success,
            retry_count = metadata.retry_count,
            duration_ms = metadata.duration.as_millis() as u64,
            fields = snapshot.len(),
            error = metadata.error.as_deref().unwrap_or(""),
            "step trace"
        );
        Ok(())
    }
}

/// Sink that discards everything
#[derive(Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record(
        &self,
        _step_name: &str,
        _snapshot: &State,
        _is_input: bool,
        _metadata: &TraceMetadata,
    ) -> Result<(), TraceError> {
        Ok(())
    }
}
