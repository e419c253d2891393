//! CLI output formatting

use crate::action::CertExpiration;
use crate::core::ExecutionStatus;
use crate::execution::PipelineEvent;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Created => style("CREATED").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a pipeline event for display
pub fn format_execution_event(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::PipelineStarted {
            execution_id,
            pipeline,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline).bold(),
            style(short_id(execution_id)).dim()
        ),
        PipelineEvent::ModuleStarted { module } => {
            format!("{} Module {}", INFO, style(module).bold())
        }
        PipelineEvent::ModuleSkipped { module } => {
            format!("{} Module {} skipped", INFO, style(module).dim())
        }
        PipelineEvent::TaskStarted { task, hosts } => format!(
            "{} {} on {} host(s)",
            SPINNER,
            style(task).cyan(),
            hosts
        ),
        PipelineEvent::HostSkipped { task, host, reason } => format!(
            "  {} [{}] {} skipped: {}",
            INFO,
            style(host).dim(),
            task,
            style(reason).dim()
        ),
        PipelineEvent::HostRetrying {
            task,
            host,
            attempt,
            max_retries,
            error,
        } => format!(
            "  {} [{}] {} (retry {}/{}): {}",
            WARN,
            style(host).yellow(),
            task,
            attempt,
            max_retries,
            style(error).dim()
        ),
        PipelineEvent::HostSucceeded { task, host, .. } => {
            format!("  {} [{}] {}", CHECK, style(host).green(), task)
        }
        PipelineEvent::HostFailed { task, host, error } => format!(
            "  {} [{}] {}: {}",
            CROSS,
            style(host).red(),
            task,
            style(error).dim()
        ),
        PipelineEvent::TaskCompleted {
            task,
            succeeded,
            failed,
            skipped,
        } => format!(
            "{} {} ({} ok, {} failed, {} skipped)",
            if *failed == 0 { CHECK } else { CROSS },
            style(task).bold(),
            style(succeeded).green(),
            style(failed).red(),
            style(skipped).dim()
        ),
        PipelineEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(short_id(execution_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format one certificate's expiry as a table row
pub fn format_expiration(cert: &CertExpiration) -> String {
    let residual = if cert.residual_days < 0 {
        style("expired".to_string()).red()
    } else if cert.residual_days < 30 {
        style(format!("{}d", cert.residual_days)).yellow()
    } else {
        style(format!("{}d", cert.residual_days)).green()
    };
    format!(
        "  {:<32} {:<24} {:<28} {}",
        cert.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
        cert.common_name,
        cert.not_after.format("%b %d, %Y %H:%M UTC"),
        residual
    )
}
