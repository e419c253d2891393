//! Task - one action fanned out over a set of hosts

use crate::action::{Action, ActionError};
use crate::core::cache::PipelineCache;
use crate::core::host::HostSelector;
use crate::core::runtime::{HostRuntime, Runtime};
use crate::execution::condition::Condition;
use crate::execution::events::{EventSink, PipelineEvent};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// What happens to the remaining hosts when one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop dispatching new hosts; in-flight hosts finish
    #[default]
    FailFast,
    /// Run every host and report all failures together
    Collect,
}

/// Final outcome of a task on one host
#[derive(Debug)]
pub enum HostStatus {
    Succeeded { output: String, attempts: usize },
    Failed { error: ActionError, attempts: usize },
    Skipped { reason: String },
    /// Never dispatched because an earlier host failed
    Cancelled,
}

impl HostStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, HostStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            HostStatus::Succeeded { .. } => "succeeded",
            HostStatus::Failed { .. } => "failed",
            HostStatus::Skipped { .. } => "skipped",
            HostStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome on one host
#[derive(Debug)]
pub struct HostResult {
    pub host: String,
    pub status: HostStatus,
    /// Completion order among the task's hosts
    finished: usize,
}

/// A failing host and its cause
#[derive(Debug)]
pub struct HostFailure {
    pub host: String,
    pub error: ActionError,
}

fn describe_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.host, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Task failures with host attribution
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task `{task}` failed on host `{host}`: {source}")]
    Host {
        task: String,
        host: String,
        #[source]
        source: ActionError,
    },

    #[error("task `{task}` failed on {} host(s): {}", .failures.len(), describe_failures(.failures))]
    Aggregate {
        task: String,
        failures: Vec<HostFailure>,
    },
}

impl TaskError {
    pub fn task(&self) -> &str {
        match self {
            TaskError::Host { task, .. } | TaskError::Aggregate { task, .. } => task,
        }
    }

    /// Names of the failing hosts
    pub fn hosts(&self) -> Vec<&str> {
        match self {
            TaskError::Host { host, .. } => vec![host.as_str()],
            TaskError::Aggregate { failures, .. } => failures.iter().map(|f| f.host.as_str()).collect(),
        }
    }
}

/// Per-host results of one task, in inventory order
#[derive(Debug)]
pub struct TaskReport {
    pub task: String,
    pub hosts: Vec<HostResult>,
    policy: FailurePolicy,
    ignore_errors: bool,
}

impl TaskReport {
    pub fn status_of(&self, host: &str) -> Option<&HostStatus> {
        self.hosts.iter().find(|r| r.host == host).map(|r| &r.status)
    }

    fn names(&self, pred: impl Fn(&HostStatus) -> bool) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|r| pred(&r.status))
            .map(|r| r.host.as_str())
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.names(|s| matches!(s, HostStatus::Succeeded { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names(HostStatus::is_failed)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names(|s| matches!(s, HostStatus::Skipped { .. }))
    }

    pub fn cancelled(&self) -> Vec<&str> {
        self.names(|s| matches!(s, HostStatus::Cancelled))
    }

    /// True when no host failed, or failures are ignored
    pub fn is_success(&self) -> bool {
        self.ignore_errors || self.failed().is_empty()
    }

    /// Turn host failures into a [`TaskError`] according to the policy
    pub fn into_result(self) -> Result<TaskReport, TaskError> {
        if self.is_success() {
            return Ok(self);
        }

        let TaskReport { task, hosts, policy, .. } = self;
        let mut failures: Vec<(usize, HostFailure)> = hosts
            .into_iter()
            .filter_map(|r| match r.status {
                HostStatus::Failed { error, .. } => Some((
                    r.finished,
                    HostFailure {
                        host: r.host,
                        error,
                    },
                )),
                _ => None,
            })
            .collect();

        match policy {
            FailurePolicy::FailFast => {
                failures.sort_by_key(|(finished, _)| *finished);
                let (_, first) = failures.remove(0);
                Err(TaskError::Host {
                    task,
                    host: first.host,
                    source: first.error,
                })
            }
            FailurePolicy::Collect => Err(TaskError::Aggregate {
                task,
                failures: failures.into_iter().map(|(_, f)| f).collect(),
            }),
        }
    }
}

/// An action bound to hosts with concurrency, retry and failure policy
pub struct Task {
    pub name: String,
    pub hosts: HostSelector,
    action: Arc<dyn Action>,
    condition: Option<Arc<dyn Condition>>,
    /// Run hosts concurrently (default) or one at a time
    pub parallel: bool,
    /// Cap on concurrently running hosts
    pub concurrency: Option<usize>,
    pub policy: FailurePolicy,
    /// Extra attempts after the first for retryable failures
    pub retries: usize,
    pub retry_delay: Duration,
    pub ignore_errors: bool,
}

impl Task {
    pub fn new(name: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            name: name.into(),
            hosts: HostSelector::All,
            action: Arc::new(action),
            condition: None,
            parallel: true,
            concurrency: None,
            policy: FailurePolicy::default(),
            retries: 0,
            retry_delay: Duration::from_secs(5),
            ignore_errors: false,
        }
    }

    pub fn on(mut self, hosts: HostSelector) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn when(mut self, condition: impl Condition + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit.max(1));
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry(mut self, retries: usize, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    fn limit(&self, host_count: usize) -> usize {
        if !self.parallel {
            return 1;
        }
        self.concurrency.unwrap_or(host_count).clamp(1, host_count.max(1))
    }

    /// Run the action on every selected host and report per-host outcomes
    pub async fn execute(
        &self,
        runtime: &Runtime,
        cache: &Arc<PipelineCache>,
        events: &EventSink,
    ) -> TaskReport {
        let hosts = runtime.select(&self.hosts);
        info!("Task {} on {} host(s)", self.name, hosts.len());
        events.emit(PipelineEvent::TaskStarted {
            task: self.name.clone(),
            hosts: hosts.len(),
        });

        let semaphore = Arc::new(Semaphore::new(self.limit(hosts.len())));
        let abort = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicUsize::new(0));
        let fail_fast = self.policy == FailurePolicy::FailFast && !self.ignore_errors;

        let mut handles = Vec::with_capacity(hosts.len());
        for host in hosts {
            let view = runtime.for_host(&host, cache.clone());
            let attempt = HostAttempt {
                task: self.name.clone(),
                action: self.action.clone(),
                condition: self.condition.clone(),
                retries: self.retries,
                retry_delay: self.retry_delay,
                events: events.clone(),
            };
            let semaphore = semaphore.clone();
            let abort = abort.clone();
            let finished = finished.clone();

            let handle = tokio::spawn(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(_permit) if fail_fast && abort.load(Ordering::SeqCst) => HostStatus::Cancelled,
                    Ok(_permit) => {
                        let status = attempt.run(&view).await;
                        if fail_fast && status.is_failed() {
                            abort.store(true, Ordering::SeqCst);
                        }
                        status
                    }
                    Err(_) => HostStatus::Cancelled,
                };
                (status, finished.fetch_add(1, Ordering::SeqCst))
            });
            handles.push((host.name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let (status, order) = match handle.await {
                Ok(done) => done,
                Err(join_error) => (
                    HostStatus::Failed {
                        error: ActionError::InvalidArgument(format!(
                            "host execution aborted: {}",
                            join_error
                        )),
                        attempts: 1,
                    },
                    usize::MAX,
                ),
            };
            if let HostStatus::Failed { error, .. } = &status {
                if self.ignore_errors {
                    warn!("[{}] {} failed, ignoring: {}", host, self.name, error);
                }
            }
            results.push(HostResult {
                host,
                status,
                finished: order,
            });
        }

        let report = TaskReport {
            task: self.name.clone(),
            hosts: results,
            policy: self.policy,
            ignore_errors: self.ignore_errors,
        };
        events.emit(PipelineEvent::TaskCompleted {
            task: self.name.clone(),
            succeeded: report.succeeded().len(),
            failed: report.failed().len(),
            skipped: report.skipped().len(),
        });
        report
    }
}

/// Everything one host needs to run the task independently
struct HostAttempt {
    task: String,
    action: Arc<dyn Action>,
    condition: Option<Arc<dyn Condition>>,
    retries: usize,
    retry_delay: Duration,
    events: EventSink,
}

impl HostAttempt {
    async fn run(&self, runtime: &HostRuntime) -> HostStatus {
        let host = runtime.remote_host().name.clone();

        if let Some(condition) = &self.condition {
            match condition.check(runtime) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("[{}] {} skipped: condition not met", host, self.task);
                    let reason = "condition not met".to_string();
                    self.events.emit(PipelineEvent::HostSkipped {
                        task: self.task.clone(),
                        host,
                        reason: reason.clone(),
                    });
                    return HostStatus::Skipped { reason };
                }
                Err(error) => return self.failed(host, error, 0),
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.action.execute(runtime).await {
                Ok(output) => {
                    debug!("[{}] {} succeeded after {} attempt(s)", host, self.task, attempt);
                    self.events.emit(PipelineEvent::HostSucceeded {
                        task: self.task.clone(),
                        host,
                        attempts: attempt,
                    });
                    return HostStatus::Succeeded {
                        output,
                        attempts: attempt,
                    };
                }
                Err(error) if error.is_retryable() && attempt <= self.retries => {
                    warn!(
                        "[{}] {} failed (attempt {}/{}): {}",
                        host,
                        self.task,
                        attempt,
                        self.retries + 1,
                        error
                    );
                    self.events.emit(PipelineEvent::HostRetrying {
                        task: self.task.clone(),
                        host: host.clone(),
                        attempt,
                        max_retries: self.retries,
                        error: error.to_string(),
                    });
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => return self.failed(host, error, attempt),
            }
        }
    }

    fn failed(&self, host: String, error: ActionError, attempts: usize) -> HostStatus {
        warn!("[{}] {} failed: {}", host, self.task, error);
        self.events.emit(PipelineEvent::HostFailed {
            task: self.task.clone(),
            host,
            error: error.to_string(),
        });
        HostStatus::Failed { error, attempts }
    }
}
