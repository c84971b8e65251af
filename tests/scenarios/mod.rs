//! Scenario-based tests for pipewright

mod resumption;
mod retry_backoff;
mod rollback;
