//! Test: module sequencing, skip predicates and the shared cache

use crate::helpers::*;
use kubefleet::action::{RegisterBinaries, ShellCommand, SyncBinary};
use kubefleet::core::config::ContainerManager;
use kubefleet::core::host::HostSelector;
use kubefleet::core::{CacheValue, PipelineCache};
use kubefleet::execution::PipelineEvent;
use kubefleet::{Module, Pipeline, PipelineError, Task, TaskError};
use std::sync::Arc;

/// Binaries registered by one module are visible to the next
#[tokio::test]
async fn test_cache_written_by_earlier_module_is_read_later() {
    let connector = Arc::new(RecordingConnector::new());
    let mut pipeline = Pipeline::new("sync", runtime(cluster(ContainerManager::Docker), &connector))
        .module(Module::new("Register").task(Task::new("register", RegisterBinaries::new()).on(HostSelector::Local)))
        .module(Module::new("Sync").task(Task::new("sync docker", SyncBinary::docker())));

    let report = pipeline.start().await.unwrap();
    assert_eq!(report.modules.len(), 2);

    for host in ["node1", "node2", "node3"] {
        let copies = connector.copies(host);
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].1, "/tmp/kubekey/docker-24.0.9.tgz");
        assert!(copies[0].0.ends_with("docker/24.0.9/amd64/docker-24.0.9.tgz"));
        assert_ran(&connector, host, "mkdir -m 777 -p /tmp/kubekey");
        assert_ran(&connector, host, "tar -zxf /tmp/kubekey/docker-24.0.9.tgz");
    }
    assert!(pipeline.cache().contains("KubeBinaries-amd64"));
}

/// A dependent action without its cache entry fails cleanly, naming the key
#[tokio::test]
async fn test_missing_binaries_is_a_precondition_error() {
    let connector = Arc::new(RecordingConnector::new());
    let mut pipeline = Pipeline::new("sync", runtime(cluster(ContainerManager::Docker), &connector))
        .module(Module::new("Sync").task(Task::new("sync docker", SyncBinary::docker())));

    let err = pipeline.start().await.unwrap_err();
    assert!(err.to_string().contains("`KubeBinaries-amd64` not found in pipeline cache"));
    match err {
        PipelineError::Module { module, source, .. } => {
            assert_eq!(module, "Sync");
            assert!(matches!(source, TaskError::Host { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn test_skipped_module_counts_as_success() {
    let connector = Arc::new(RecordingConnector::new());
    let events = EventLog::default();
    let mut pipeline = Pipeline::new("skip", runtime(cluster(ContainerManager::Docker), &connector))
        .module(
            Module::new("NeedsFlag")
                .skip_when(|_, cache| !cache.contains("Ready"))
                .task(Task::new("touch", ShellCommand::new("touch", "touch /tmp/ready"))),
        )
        .module(Module::new("Always").task(Task::new("echo", ShellCommand::new("echo", "echo hi"))));
    pipeline.add_event_handler(events.handler());

    let report = pipeline.start().await.unwrap();

    assert_eq!(report.skipped_modules(), vec!["NeedsFlag"]);
    assert_not_ran(&connector, "node1", "touch /tmp/ready");
    assert_ran(&connector, "node1", "echo hi");
    assert!(events.events().contains(&PipelineEvent::ModuleSkipped {
        module: "NeedsFlag".to_string()
    }));
}

/// The skip predicate sees values set before the run
#[tokio::test]
async fn test_injected_cache_drives_skip() {
    let connector = Arc::new(RecordingConnector::new());
    let cache = Arc::new(PipelineCache::new());
    cache.set("Ready", CacheValue::Flag(true));

    let mut pipeline = Pipeline::new("skip", runtime(cluster(ContainerManager::Docker), &connector))
        .with_cache(cache)
        .module(
            Module::new("NeedsFlag")
                .skip_when(|_, cache| !cache.contains("Ready"))
                .task(Task::new("touch", ShellCommand::new("touch", "touch /tmp/ready"))),
        );

    let report = pipeline.start().await.unwrap();
    assert!(report.skipped_modules().is_empty());
    assert_ran(&connector, "node2", "touch /tmp/ready");
}

/// Tasks run in order and a failing task stops its module and the pipeline
#[tokio::test]
async fn test_failing_task_stops_later_tasks_and_modules() {
    let connector = Arc::new(RecordingConnector::new().fail_on("step-two"));
    let mut pipeline = Pipeline::new("order", runtime(cluster(ContainerManager::Docker), &connector))
        .module(
            Module::new("First")
                .task(Task::new("one", ShellCommand::new("one", "echo step-one")))
                .task(Task::new("two", ShellCommand::new("two", "echo step-two")))
                .task(Task::new("three", ShellCommand::new("three", "echo step-three"))),
        )
        .module(Module::new("Second").task(Task::new("four", ShellCommand::new("four", "echo step-four"))));

    let err = pipeline.start().await.unwrap_err();
    assert!(err.to_string().contains("module `First`"));
    assert!(err.to_string().contains("two failed"));

    let commands = connector.commands("node1");
    assert_eq!(commands, vec!["echo step-one", "echo step-two"]);
    assert_not_ran(&connector, "node2", "step-four");
}
