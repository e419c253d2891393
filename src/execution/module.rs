//! Module - an ordered group of tasks with an optional skip predicate

use crate::core::cache::PipelineCache;
use crate::core::config::ClusterConfig;
use crate::core::runtime::Runtime;
use crate::execution::events::{EventSink, PipelineEvent};
use crate::execution::task::{Task, TaskError, TaskReport};
use std::sync::Arc;
use tracing::info;

/// Predicate over the pipeline context; `true` skips the whole module
pub type SkipPredicate = Arc<dyn Fn(&ClusterConfig, &PipelineCache) -> bool + Send + Sync>;

/// A named sequence of tasks
pub struct Module {
    pub name: String,
    pub tasks: Vec<Task>,
    skip: Option<SkipPredicate>,
}

/// Outcome of one module
#[derive(Debug)]
pub struct ModuleReport {
    pub module: String,
    pub skipped: bool,
    pub tasks: Vec<TaskReport>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            skip: None,
        }
    }

    /// Append a task
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClusterConfig, &PipelineCache) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    pub fn is_skipped(&self, config: &ClusterConfig, cache: &PipelineCache) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(config, cache))
    }

    /// Run tasks strictly in order, stopping at the first task error
    pub async fn run(
        &self,
        runtime: &Runtime,
        cache: &Arc<PipelineCache>,
        events: &EventSink,
    ) -> Result<ModuleReport, TaskError> {
        if self.is_skipped(runtime.config(), cache) {
            info!("Module {} skipped", self.name);
            events.emit(PipelineEvent::ModuleSkipped {
                module: self.name.clone(),
            });
            return Ok(ModuleReport {
                module: self.name.clone(),
                skipped: true,
                tasks: Vec::new(),
            });
        }

        info!("Module {} started", self.name);
        events.emit(PipelineEvent::ModuleStarted {
            module: self.name.clone(),
        });

        let mut reports = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let report = task.execute(runtime, cache, events).await.into_result()?;
            reports.push(report);
        }

        Ok(ModuleReport {
            module: self.name.clone(),
            skipped: false,
            tasks: reports,
        })
    }
}
