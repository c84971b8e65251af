//! CLI output formatting

use crate::core::{RunOutcome, RunStatus, State, FAILED_STEP, RECOVERY_ATTEMPTED};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Aborted => style("ABORTED").red().to_string(),
        RunStatus::Partial => style("PARTIAL").yellow().to_string(),
    }
}

/// One-line summary of how a run ended
pub fn format_outcome(name: &str, outcome: &RunOutcome) -> String {
    let icon = match outcome.status {
        RunStatus::Completed => CHECK,
        RunStatus::Aborted => CROSS,
        RunStatus::Partial => WARN,
    };

    let mut line = format!(
        "{} {} - {} ({})",
        icon,
        style(name).bold(),
        format_status(outcome.status),
        style(&outcome.execution_id.to_string()[..8]).dim()
    );

    if let Some(detail) = format_failure_detail(&outcome.state) {
        line.push_str(&detail);
    }
    line
}

fn format_failure_detail(state: &State) -> Option<String> {
    let failed_step = state.get_str(FAILED_STEP)?;
    let attempted = state.get_str(RECOVERY_ATTEMPTED).unwrap_or("?");
    Some(format!(
        "\n  {} failed step {} (recovery: {})",
        WARN,
        style(failed_step).bold(),
        style(attempted).yellow()
    ))
}
