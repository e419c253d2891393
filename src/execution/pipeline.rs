//! Pipeline - ordered modules bound to a runtime and a cache

use crate::core::cache::PipelineCache;
use crate::core::runtime::Runtime;
use crate::core::state::{ExecutionStatus, PipelineState};
use crate::execution::events::{EventHandler, EventSink, PipelineEvent};
use crate::execution::module::{Module, ModuleReport};
use crate::execution::task::TaskError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Errors that end a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline `{pipeline}` failed in module `{module}`: {source}")]
    Module {
        pipeline: String,
        module: String,
        #[source]
        source: TaskError,
    },

    #[error("pipeline `{pipeline}` already finished with status {status}")]
    AlreadyFinished {
        pipeline: String,
        status: ExecutionStatus,
    },
}

/// Summary of a successful run
#[derive(Debug)]
pub struct PipelineReport {
    pub execution_id: Uuid,
    pub pipeline: String,
    pub modules: Vec<ModuleReport>,
}

impl PipelineReport {
    pub fn skipped_modules(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| m.skipped)
            .map(|m| m.module.as_str())
            .collect()
    }
}

/// A runnable pipeline
pub struct Pipeline {
    pub name: String,
    pub modules: Vec<Module>,
    runtime: Arc<Runtime>,
    cache: Arc<PipelineCache>,
    state: PipelineState,
    handlers: Vec<EventHandler>,
}

impl Pipeline {
    /// Create a pipeline with a fresh cache
    pub fn new(name: impl Into<String>, runtime: Runtime) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            runtime: Arc::new(runtime),
            cache: Arc::new(PipelineCache::new()),
            state: PipelineState::new(),
            handlers: Vec::new(),
        }
    }

    /// Append a module
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Run against an externally owned cache
    pub fn with_cache(mut self, cache: Arc<PipelineCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    pub fn cache(&self) -> &Arc<PipelineCache> {
        &self.cache
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Execute every module in order
    pub async fn start(&mut self) -> Result<PipelineReport, PipelineError> {
        if self.state.start(self.modules.len()).is_err() {
            return Err(PipelineError::AlreadyFinished {
                pipeline: self.name.clone(),
                status: self.state.status,
            });
        }

        let execution_id = self.state.execution_id;
        let events = EventSink::new(self.handlers.clone());
        info!("Starting pipeline execution: {} ({})", self.name, execution_id);
        events.emit(PipelineEvent::PipelineStarted {
            execution_id,
            pipeline: self.name.clone(),
        });

        let mut reports = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            match module.run(&self.runtime, &self.cache, &events).await {
                Ok(report) => {
                    self.state.module_done();
                    reports.push(report);
                }
                Err(source) => {
                    error!("Pipeline {} failed in module {}: {}", self.name, module.name, source);
                    // Running -> Failed cannot be rejected here
                    let _ = self.state.fail();
                    events.emit(PipelineEvent::PipelineCompleted {
                        execution_id,
                        status: self.state.status,
                    });
                    return Err(PipelineError::Module {
                        pipeline: self.name.clone(),
                        module: module.name.clone(),
                        source,
                    });
                }
            }
        }

        let _ = self.state.succeed();
        info!("Pipeline execution finished: {} - {}", self.name, self.state.status);
        events.emit(PipelineEvent::PipelineCompleted {
            execution_id,
            status: self.state.status,
        });

        Ok(PipelineReport {
            execution_id,
            pipeline: self.name.clone(),
            modules: reports,
        })
    }
}
