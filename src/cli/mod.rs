//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CertsCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Cluster lifecycle orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "kubefleet")]
#[command(version)]
#[command(about = "Drive a fleet of hosts through cluster lifecycle pipelines", long_about = None)]
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
    /// Run a named pipeline against a cluster
    Run(RunCommand),

    /// Validate a cluster configuration
    Validate(ValidateCommand),

    /// Inspect generated certificates
    #[command(subcommand)]
    Certs(CertsCommand),
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
