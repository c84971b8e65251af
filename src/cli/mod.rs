//! Command-line interface

pub mod commands;
pub mod output;
pub mod shell_step;

pub use shell_step::ShellStep;

use clap::{Parser, Subcommand};
use commands::{RunCommand, ValidateCommand};

/// Resilient pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "pipewright")]
#[command(version = "0.1.0")]
#[command(about = "Run step pipelines with checkpointing and recovery policies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

use std::ffi::OsString;
