//! Test: variable rendering through the debug and command actions

use crate::helpers::*;
use kubefleet::action::{Inspect, ShellCommand};
use kubefleet::core::config::ContainerManager;
use kubefleet::core::host::{HostSelector, Role};
use kubefleet::execution::HostStatus;
use kubefleet::{Module, Pipeline, Task};
use serde_json::json;
use std::sync::Arc;

fn output(status: Option<&HostStatus>) -> String {
    match status {
        Some(HostStatus::Succeeded { output, .. }) => output.clone(),
        other => panic!("unexpected status {other:?}"),
    }
}

#[tokio::test]
async fn test_debug_renders_host_variables() {
    let connector = Arc::new(RecordingConnector::new());
    let mut config = cluster(ContainerManager::Containerd);
    config.variables.insert("cluster_domain".into(), json!("cluster.local"));
    config.hosts[1].vars.insert("cluster_domain".into(), json!("edge.local"));

    let mut pipeline = Pipeline::new("debug", runtime(config, &connector)).module(
        Module::new("Debug")
            .task(Task::new("var", Inspect::new(json!({"var": "cluster_domain"}))))
            .task(Task::new("msg", Inspect::new(json!({"msg": "{{ inventory_name }} at {{ address }}"}))))
            .task(
                Task::new("groups", Inspect::new(json!({"var": "groups.worker | join(',')"})))
                    .on(HostSelector::Roles(vec![Role::ControlPlane])),
            ),
    );

    let report = pipeline.start().await.unwrap();
    let tasks = &report.modules[0].tasks;

    assert_eq!(output(tasks[0].status_of("node1")), "cluster.local");
    assert_eq!(output(tasks[0].status_of("node2")), "edge.local");
    assert_eq!(output(tasks[1].status_of("node3")), "node3 at 10.0.0.3");
    assert_eq!(output(tasks[2].status_of("node1")), "node2,node3");
    assert!(tasks[2].status_of("node2").is_none());
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn test_command_template_is_rendered_per_host() {
    let connector = Arc::new(RecordingConnector::new().reply("hostnamectl", "renamed"));
    let mut pipeline = Pipeline::new("hostname", runtime(cluster(ContainerManager::Containerd), &connector)).module(
        Module::new("Hostname").task(Task::new(
            "set hostname",
            ShellCommand::new("set hostname", "hostnamectl set-hostname {{ inventory_name }} # {{ internal_address }}"),
        )),
    );

    let report = pipeline.start().await.unwrap();

    assert_eq!(
        connector.commands("node2"),
        vec!["hostnamectl set-hostname node2 # 10.0.0.2"]
    );
    assert_eq!(output(report.modules[0].tasks[0].status_of("node2")), "renamed");
}

#[tokio::test]
async fn test_undefined_variable_fails_before_running() {
    let connector = Arc::new(RecordingConnector::new());
    let mut pipeline = Pipeline::new("undefined", runtime(cluster(ContainerManager::Containerd), &connector)).module(
        Module::new("Echo").task(Task::new("echo", ShellCommand::new("echo", "echo {{ missing.value }}"))),
    );

    let err = pipeline.start().await.unwrap_err();
    assert!(err.to_string().contains("missing.value"));
    assert!(connector.calls().is_empty());
}
