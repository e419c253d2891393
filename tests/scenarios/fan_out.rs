//! Test: host fan-out, failure policies, retries and conditions

use crate::helpers::*;
use async_trait::async_trait;
use kubefleet::action::{EnableService, Inspect};
use kubefleet::core::config::ContainerManager;
use kubefleet::core::host::Role;
use kubefleet::core::runtime::HostRuntime;
use kubefleet::core::PipelineCache;
use kubefleet::execution::{CacheFlag, EventHandler, EventSink, HostStatus, PipelineEvent};
use kubefleet::{Action, ActionError, FailurePolicy, Task, TaskError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn setup(connector: RecordingConnector) -> (Arc<RecordingConnector>, kubefleet::Runtime) {
    let connector = Arc::new(connector);
    let runtime = runtime(cluster(ContainerManager::Docker), &connector);
    (connector, runtime)
}

/// One failing host does not affect the others under Collect
#[tokio::test]
async fn test_collect_isolates_failures() {
    let (connector, runtime) = setup(RecordingConnector::new().fail_on_host("node2", "systemctl enable docker"));
    let task = Task::new("enable docker", EnableService::docker()).policy(FailurePolicy::Collect);

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    assert_eq!(report.succeeded(), vec!["node1", "node3"]);
    assert_eq!(report.failed(), vec!["node2"]);
    assert_ran(&connector, "node1", "systemctl enable docker");
    assert_ran(&connector, "node3", "systemctl enable docker");

    match report.into_result() {
        Err(TaskError::Aggregate { task, failures }) => {
            assert_eq!(task, "enable docker");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].host, "node2");
            assert!(failures[0].error.to_string().contains("enable and start docker failed"));
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }
}

/// Serial fail-fast stops dispatching after the first failure
#[tokio::test]
async fn test_fail_fast_cancels_remaining_hosts() {
    let (connector, runtime) = setup(RecordingConnector::new().fail_on_host("node1", "systemctl"));
    let task = Task::new("enable docker", EnableService::docker()).serial();

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    assert_eq!(report.failed(), vec!["node1"]);
    assert_eq!(report.cancelled(), vec!["node2", "node3"]);
    assert_eq!(connector.touched_hosts(), vec!["node1"]);

    let err = report.into_result().unwrap_err();
    assert!(matches!(&err, TaskError::Host { host, .. } if host == "node1"));
    assert_eq!(err.hosts(), vec!["node1"]);
}

/// Retries report only the final outcome
#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (_connector, runtime) = setup(RecordingConnector::new().fail_times("node2", "systemctl", 2));
    let events = EventLog::default();
    let handler: EventHandler = Arc::new(events.handler());
    let sink = EventSink::new(vec![handler]);
    let task = Task::new("enable docker", EnableService::docker()).retry(2, Duration::ZERO);

    let report = task.execute(&runtime, &Arc::new(PipelineCache::new()), &sink).await;

    assert!(report.is_success());
    match report.status_of("node2") {
        Some(HostStatus::Succeeded { attempts, .. }) => assert_eq!(*attempts, 3),
        other => panic!("unexpected status {other:?}"),
    }
    match report.status_of("node1") {
        Some(HostStatus::Succeeded { attempts, .. }) => assert_eq!(*attempts, 1),
        other => panic!("unexpected status {other:?}"),
    }

    let retries: Vec<_> = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::HostRetrying { host, .. } if host == "node2"))
        .collect();
    assert_eq!(retries.len(), 2);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let (connector, runtime) = setup(RecordingConnector::new().fail_on_host("node3", "systemctl"));
    let task = Task::new("enable docker", EnableService::docker())
        .policy(FailurePolicy::Collect)
        .retry(1, Duration::ZERO);

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    match report.status_of("node3") {
        Some(HostStatus::Failed { attempts, .. }) => assert_eq!(*attempts, 2),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(connector.commands("node3").len(), 2);
}

/// Argument errors are not transport errors and fail on the first attempt
#[tokio::test]
async fn test_argument_errors_are_not_retried() {
    let (_connector, runtime) = setup(RecordingConnector::new());
    let task = Task::new("debug", Inspect::new(json!({}))).retry(3, Duration::ZERO);

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    match report.status_of("node1") {
        Some(HostStatus::Failed { attempts, error }) => {
            assert_eq!(*attempts, 1);
            assert!(matches!(error, ActionError::InvalidArgument(_)));
        }
        other => panic!("unexpected status {other:?}"),
    }
}

#[tokio::test]
async fn test_condition_skips_hosts() {
    let (connector, runtime) = setup(RecordingConnector::new());
    let task = Task::new("enable docker", EnableService::docker())
        .when(|rt: &HostRuntime| -> Result<bool, ActionError> { Ok(rt.remote_host().has_role(Role::Worker)) });

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    assert_eq!(report.skipped(), vec!["node1"]);
    assert_eq!(report.succeeded(), vec!["node2", "node3"]);
    assert!(connector.commands("node1").is_empty());
}

/// A condition that cannot be evaluated fails the host without running the action
#[tokio::test]
async fn test_condition_error_fails_host() {
    let (connector, runtime) = setup(RecordingConnector::new());
    let task = Task::new("enable docker", EnableService::docker())
        .when(CacheFlag::is_set("DockerInstalled"))
        .policy(FailurePolicy::Collect);

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    assert_eq!(report.failed(), vec!["node1", "node2", "node3"]);
    match report.status_of("node1") {
        Some(HostStatus::Failed { attempts, error }) => {
            assert_eq!(*attempts, 0);
            assert!(error.to_string().contains("DockerInstalled"));
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn test_ignore_errors_downgrades_failures() {
    let (_connector, runtime) = setup(RecordingConnector::new().fail_on("systemctl"));
    let task = Task::new("enable docker", EnableService::docker()).ignore_errors();

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;

    assert_eq!(report.failed().len(), 3);
    assert!(report.into_result().is_ok());
}

/// Tracks how many hosts run at once
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Action for Gauge {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn execute(&self, _runtime: &HostRuntime) -> Result<String, ActionError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(String::new())
    }
}

struct SharedGauge(Arc<Gauge>);

#[async_trait]
impl Action for SharedGauge {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        self.0.execute(runtime).await
    }
}

async fn peak_concurrency(configure: impl Fn(Task) -> Task) -> usize {
    let (_connector, runtime) = setup(RecordingConnector::new());
    let gauge = Arc::new(Gauge {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let task = configure(Task::new("gauge", SharedGauge(gauge.clone())));

    let report = task
        .execute(&runtime, &Arc::new(PipelineCache::new()), &EventSink::default())
        .await;
    assert!(report.is_success());
    gauge.peak.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_concurrency_limits() {
    assert_eq!(peak_concurrency(|t| t).await, 3);
    assert_eq!(peak_concurrency(|t| t.concurrency(2)).await, 2);
    assert_eq!(peak_concurrency(|t| t.serial()).await, 1);
}
