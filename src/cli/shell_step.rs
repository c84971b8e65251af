//! Shell command step - the binary's concrete step implementation

use crate::core::{State, Step, StepError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Runs a shell command; stdout lands in `steps.<name>.stdout`.
pub struct ShellStep {
    name: String,
    command: String,
}

impl ShellStep {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

#[async_trait]
impl Step for ShellStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: State) -> Result<State, StepError> {
        debug!("Running command for step {}: {}", self.name, self.command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| StepError::Resource(format!("failed to spawn command: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(StepError::Execution(format!(
                "command exited with {}: {}",
                output.status,
                if stderr.is_empty() { &stdout } else { &stderr }
            )));
        }

        state.insert(format!("steps.{}.stdout", self.name), stdout);
        Ok(state)
    }
}
