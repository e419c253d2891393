//! Events emitted while a pipeline runs

use crate::core::ExecutionStatus;
use std::sync::Arc;
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline: String,
    },
    ModuleStarted {
        module: String,
    },
    ModuleSkipped {
        module: String,
    },
    TaskStarted {
        task: String,
        hosts: usize,
    },
    HostSkipped {
        task: String,
        host: String,
        reason: String,
    },
    HostRetrying {
        task: String,
        host: String,
        attempt: usize,
        max_retries: usize,
        error: String,
    },
    HostSucceeded {
        task: String,
        host: String,
        attempts: usize,
    },
    HostFailed {
        task: String,
        host: String,
        error: String,
    },
    TaskCompleted {
        task: String,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Fan-out of events to every registered handler
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Arc<Vec<EventHandler>>,
}

impl EventSink {
    pub fn new(handlers: Vec<EventHandler>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: PipelineEvent) {
        for handler in self.handlers.iter() {
            handler(event.clone());
        }
    }
}
