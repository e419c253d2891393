//! CLI command definitions

use crate::phases::PipelineKind;
use clap::{Args, Subcommand};

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to cluster YAML file
    #[arg(short, long)]
    pub file: String,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Pipeline to run
    #[arg(value_enum)]
    pub pipeline: PipelineArg,
}

/// Validate a cluster configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to cluster YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Certificate commands
#[derive(Debug, Subcommand, Clone)]
pub enum CertsCommand {
    /// Show when each certificate in a directory expires
    CheckExpiration(CheckExpirationCommand),
}

#[derive(Debug, Args, Clone)]
pub struct CheckExpirationCommand {
    /// Directory holding `*.crt` files
    #[arg(long, default_value = "./kubekey/pki")]
    pub dir: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Pipeline argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PipelineArg {
    InstallRuntime,
    UninstallRuntime,
    RegistryLogin,
    Certs,
    UpgradeNodes,
}

impl From<PipelineArg> for PipelineKind {
    fn from(arg: PipelineArg) -> Self {
        match arg {
            PipelineArg::InstallRuntime => PipelineKind::InstallRuntime,
            PipelineArg::UninstallRuntime => PipelineKind::UninstallRuntime,
            PipelineArg::RegistryLogin => PipelineKind::RegistryLogin,
            PipelineArg::Certs => PipelineKind::Certs,
            PipelineArg::UpgradeNodes => PipelineKind::UpgradeNodes,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
