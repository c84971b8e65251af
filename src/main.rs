mod cli;
mod core;
mod execution;
mod recovery;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::commands::{RunCommand, ValidateCommand};
use cli::output::*;
use cli::shell_step::ShellStep;
use cli::{Cli, Command};
use crate::core::config::PipelineConfig;
use crate::core::StepRegistry;
use execution::{LogTraceSink, PipelineExecutor};
use recovery::{CheckpointStore, RecoveryManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file)
        .context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let policies = config
        .to_policy_set()
        .context("Invalid recovery configuration")?;

    let mut registry = StepRegistry::new();
    for step in &config.steps {
        registry.register(Arc::new(ShellStep::new(&step.name, &step.command)));
    }

    let mut state = config.to_initial_state();
    for (key, value) in &cmd.set {
        println!(
            "{} State override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
        state.insert(key.clone(), value.clone());
    }

    let checkpoints = match checkpoint_dir(cmd, &config.name) {
        Some(dir) => {
            println!("{} Persisting checkpoints to {}", INFO, dir.display());
            CheckpointStore::with_persist_dir(dir)
        }
        None => CheckpointStore::new(),
    };

    let recovery = RecoveryManager::new().with_checkpoint_store(checkpoints);
    let mut executor =
        PipelineExecutor::new(recovery, policies).with_trace_sink(Arc::new(LogTraceSink));

    println!("{} Running {} steps", ROCKET, registry.len());
    let outcome = match &cmd.from_step {
        Some(step) => executor
            .resume_from(&registry, state, step)
            .await
            .with_context(|| format!("Cannot resume from step '{}'", step))?,
        None => executor.run(&registry, state).await,
    };

    println!("\n{}", format_outcome(&config.name, &outcome));

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outcome.state)?);
    }

    if outcome.is_aborted() {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file).and_then(|c| c.to_policy_set().map(|_| c)) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

/// Audit directory for this run's checkpoints, when persistence is requested
fn checkpoint_dir(cmd: &RunCommand, pipeline_name: &str) -> Option<PathBuf> {
    if let Some(dir) = &cmd.checkpoint_dir {
        return Some(dir.clone());
    }
    if !cmd.keep_checkpoints {
        return None;
    }

    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".pipewright"));
    let slug: String = pipeline_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    Some(
        base.join("pipewright")
            .join("checkpoints")
            .join(format!("{}-{}", slug, Utc::now().format("%Y%m%dT%H%M%S"))),
    )
}
