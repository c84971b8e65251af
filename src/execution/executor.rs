//! Step invocation boundary - converts a raised error into a plain value

use crate::core::{State, Step, StepError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of one step attempt.
///
/// The raw error is caught exactly once, here; everything downstream (the
/// recovery manager, the driver loop) operates on this value instead of a
/// try/catch chain. `Failure` carries the pre-attempt state, so a failed
/// step's partial effects are always discarded.
#[derive(Debug)]
pub enum StepOutcome {
    Success(State),
    Failure { error: StepError, state: State },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }
}

/// Run one attempt of `step` over a copy of `input`, measuring its duration.
pub async fn invoke_step(step: &dyn Step, input: &State) -> (StepOutcome, Duration) {
    debug!("Invoking step: {}", step.name());
    let started = Instant::now();

    let outcome = match step.run(input.clone()).await {
        Ok(state) => {
            info!("Step {} succeeded", step.name());
            StepOutcome::Success(state)
        }
        Err(error) => {
            info!("Step {} failed: {}", step.name(), error);
            StepOutcome::Failure {
                error,
                state: input.clone(),
            }
        }
    };

    (outcome, started.elapsed())
}
