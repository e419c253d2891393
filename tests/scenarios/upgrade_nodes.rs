//! Test: rolling nodes to the configured Kubernetes version

use crate::helpers::*;
use kubefleet::core::config::{ContainerManager, KubernetesType};
use kubefleet::core::cache::CacheValue;
use kubefleet::PipelineKind;
use std::sync::Arc;

const KUBELET_VERSION_CMD: &str = "kubelet --version";

fn kubelets(current: &str) -> RecordingConnector {
    RecordingConnector::new().reply(KUBELET_VERSION_CMD, &format!("Kubernetes {}\n", current))
}

fn synced(connector: &RecordingConnector, host: &str) -> Vec<String> {
    connector.copies(host).into_iter().map(|(_, remote)| remote).collect()
}

#[tokio::test]
async fn test_upgrade_only_nodes_behind_target() {
    let connector = Arc::new(kubelets("v1.27.3").reply_on_host("node3", KUBELET_VERSION_CMD, "Kubernetes v1.28.8"));
    let mut pipeline = PipelineKind::UpgradeNodes.build(runtime(cluster(ContainerManager::Containerd), &connector));

    let report = pipeline.start().await.unwrap();
    assert!(report.skipped_modules().is_empty());
    assert_eq!(
        pipeline.cache().get("KubeletVersion-node3"),
        Some(CacheValue::Text("1.28.8".to_string()))
    );

    for host in ["node1", "node2"] {
        assert_eq!(
            synced(&connector, host),
            vec!["/tmp/kubekey/kubeadm", "/tmp/kubekey/kubelet", "/tmp/kubekey/kubectl"]
        );
        assert_ran(&connector, host, "install -m 755 /tmp/kubekey/kubelet /usr/local/bin/kubelet");
        assert_ran(&connector, host, "/usr/local/bin/kubeadm upgrade node");
        assert_ran(&connector, host, "systemctl restart kubelet");
    }
    assert!(synced(&connector, "node3").is_empty());
    assert_not_ran(&connector, "node3", "kubeadm upgrade node");
    assert_not_ran(&connector, "node3", "systemctl restart kubelet");
}

#[tokio::test]
async fn test_control_plane_upgrades_before_workers() {
    let connector = Arc::new(kubelets("v1.27.3"));
    let mut pipeline = PipelineKind::UpgradeNodes.build(runtime(cluster(ContainerManager::Containerd), &connector));

    pipeline.start().await.unwrap();

    let upgrades: Vec<String> = connector
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Exec { host, command, .. } if command.contains("kubeadm upgrade node") => Some(host),
            _ => None,
        })
        .collect();
    assert_eq!(upgrades[0], "node1");
    assert_eq!(upgrades.len(), 3);
}

#[tokio::test]
async fn test_up_to_date_cluster_skips_upgrade() {
    let connector = Arc::new(kubelets("v1.28.8"));
    let mut pipeline = PipelineKind::UpgradeNodes.build(runtime(cluster(ContainerManager::Containerd), &connector));

    let report = pipeline.start().await.unwrap();

    assert_eq!(report.skipped_modules(), vec!["UpgradeNodes"]);
    for host in ["node1", "node2", "node3"] {
        assert!(synced(&connector, host).is_empty());
        assert_not_ran(&connector, host, "systemctl restart kubelet");
    }
}

#[tokio::test]
async fn test_skipping_a_minor_version_is_refused() {
    let connector = Arc::new(kubelets("v1.27.3").reply_on_host("node2", KUBELET_VERSION_CMD, "Kubernetes v1.26.0"));
    let mut pipeline = PipelineKind::UpgradeNodes.build(runtime(cluster(ContainerManager::Containerd), &connector));

    let err = pipeline.start().await.unwrap_err();

    assert!(err.to_string().contains("UpgradePreCheck"));
    assert!(err.to_string().contains("skips a minor version"));
    for host in ["node1", "node2", "node3"] {
        assert!(synced(&connector, host).is_empty());
    }
}

#[tokio::test]
async fn test_unsupported_kubernetes_type_touches_no_host() {
    let connector = Arc::new(kubelets("v1.27.3"));
    let mut config = cluster(ContainerManager::Containerd);
    config.kubernetes.kube_type = KubernetesType::K3s;
    let mut pipeline = PipelineKind::UpgradeNodes.build(runtime(config, &connector));

    let err = pipeline.start().await.unwrap_err();

    assert!(err.to_string().contains("unsupported cluster kubernetes type: k3s"));
    assert!(connector.touched_hosts().is_empty());
}
