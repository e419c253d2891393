use anyhow::{Context, Result};
use kubefleet::action::cert::scan_expirations;
use kubefleet::cli::commands::{CertsCommand, CheckExpirationCommand, RunCommand, ValidateCommand};
use kubefleet::cli::output::*;
use kubefleet::cli::{Cli, Command};
use kubefleet::{ClusterConfig, PipelineKind, Runtime, SshConnector};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_cluster(cmd)?,
        Command::Certs(CertsCommand::CheckExpiration(cmd)) => check_expiration(cmd)?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let mut config = ClusterConfig::from_file(&cmd.file).context("Failed to load cluster config")?;

    println!("{} Loaded cluster: {}", INFO, style(&config.name).bold());

    // Apply variable overrides
    for (key, value) in &cmd.variable {
        config.variables.insert(key.clone(), Value::String(value.clone()));
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let connector = SshConnector::new(config.settings.command_timeout_secs);
    let runtime = Runtime::new(config, Arc::new(connector));

    let kind = PipelineKind::from(cmd.pipeline);
    let mut pipeline = kind.build(runtime);
    pipeline.add_event_handler(|event| println!("{}", format_execution_event(&event)));

    println!();
    match pipeline.start().await {
        Ok(report) => {
            for module in report.skipped_modules() {
                println!("{} {} not applicable, skipped", INFO, style(module).dim());
            }
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(kind).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(e) => {
            println!("\n{} {} {}", CROSS, style(kind).bold(), style("failed").red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn validate_cluster(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating cluster configuration...", INFO);

    match ClusterConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Cluster configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Hosts: {}", style(config.hosts.len()).cyan());
            println!("  Kubernetes: {}", style(&config.kubernetes.version).cyan());
            println!(
                "  Container manager: {}",
                style(format!("{:?}", config.kubernetes.container_manager).to_lowercase()).cyan()
            );

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn check_expiration(cmd: &CheckExpirationCommand) -> Result<()> {
    let certs = scan_expirations(Path::new(&cmd.dir))?;

    if certs.is_empty() {
        println!("{} No certificates found in {}", WARN, cmd.dir);
        return Ok(());
    }

    if cmd.json {
        let data: Vec<Value> = certs
            .iter()
            .map(|c| {
                serde_json::json!({
                    "path": c.path,
                    "common_name": c.common_name,
                    "not_after": c.not_after.to_rfc3339(),
                    "residual_days": c.residual_days,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "{} {:<32} {:<24} {:<28} {}",
        INFO, "CERTIFICATE", "COMMON NAME", "EXPIRES", "RESIDUAL TIME"
    );
    for cert in &certs {
        println!("{}", format_expiration(cert));
    }
    Ok(())
}
