//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has been built but not started
    Created,
    /// Pipeline is currently running
    Running,
    /// Every module completed or was skipped
    Succeeded,
    /// A module returned a hard error
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStatus::Created => "created",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Rejected lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution succeeded/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of modules
    pub total_modules: usize,

    /// Modules that finished, skipped ones included
    pub completed_modules: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Created,
            started_at: None,
            completed_at: None,
            total_modules: 0,
            completed_modules: 0,
        }
    }

    /// Created -> Running
    pub fn start(&mut self, total_modules: usize) -> Result<(), InvalidTransition> {
        self.transition(ExecutionStatus::Created, ExecutionStatus::Running)?;
        self.started_at = Some(Utc::now());
        self.total_modules = total_modules;
        Ok(())
    }

    /// Record one finished module
    pub fn module_done(&mut self) {
        self.completed_modules += 1;
    }

    /// Running -> Succeeded
    pub fn succeed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Succeeded)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Failed
    pub fn fail(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_modules == 0 {
            return 0.0;
        }
        self.completed_modules as f64 / self.total_modules as f64
    }

    fn transition(&mut self, from: ExecutionStatus, to: ExecutionStatus) -> Result<(), InvalidTransition> {
        if self.status != from {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
