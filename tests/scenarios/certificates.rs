//! Test: certificate generation, reuse and replacement

use crate::helpers::*;
use kubefleet::action::cert::check_expiration;
use kubefleet::action::GenCert;
use kubefleet::core::config::ContainerManager;
use kubefleet::core::host::{Host, HostSelector, Role, LOCAL_HOST};
use kubefleet::execution::{HostStatus, PipelineReport};
use kubefleet::{ClusterConfig, Module, Pipeline, PipelineKind, Task};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> ClusterConfig {
    let mut config = cluster(ContainerManager::Containerd);
    config.artifacts.work_dir = dir.path().to_path_buf();
    config
}

async fn run_certs(config: ClusterConfig) -> PipelineReport {
    let connector = Arc::new(RecordingConnector::new());
    let mut pipeline = PipelineKind::Certs.build(runtime(config, &connector));
    let report = pipeline.start().await.unwrap();
    assert!(connector.calls().is_empty());
    report
}

fn output(report: &PipelineReport, task: usize) -> String {
    match report.modules[0].tasks[task].status_of(LOCAL_HOST) {
        Some(HostStatus::Succeeded { output, .. }) => output.clone(),
        other => panic!("unexpected status {other:?}"),
    }
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[tokio::test]
async fn test_generates_root_and_server_certificates() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.variables.insert("ca_common_name".into(), json!("prod-ca"));

    let report = run_certs(config).await;
    assert_eq!(output(&report, 0), "success");
    assert_eq!(output(&report, 1), "success");

    let pki = dir.path().join("pki");
    let root = check_expiration(&pki.join("root.crt")).unwrap();
    assert_eq!(root.common_name, "prod-ca");
    assert!(root.residual_days > 3600);

    let server = check_expiration(&pki.join("server.crt")).unwrap();
    assert_eq!(server.common_name, "kube-apiserver");
    assert!((363..=365).contains(&server.residual_days));
    assert!(pki.join("server.key").exists());
}

/// A second run reuses the valid server certificate byte for byte
#[tokio::test]
async fn test_second_run_reuses_certificates() {
    let dir = TempDir::new().unwrap();
    run_certs(config(&dir)).await;

    let pki = dir.path().join("pki");
    let root_before = read(&pki.join("root.crt"));
    let server_before = read(&pki.join("server.crt"));
    let key_before = read(&pki.join("server.key"));

    let report = run_certs(config(&dir)).await;
    assert_eq!(output(&report, 1), "skip");
    assert_eq!(read(&pki.join("root.crt")), root_before);
    assert_eq!(read(&pki.join("server.crt")), server_before);
    assert_eq!(read(&pki.join("server.key")), key_before);
}

/// A missing SAN rejects reuse, but existing files are still not replaced
#[tokio::test]
async fn test_san_gap_keeps_existing_files_under_if_not_present() {
    let dir = TempDir::new().unwrap();
    run_certs(config(&dir)).await;

    let pki = dir.path().join("pki");
    let server_before = read(&pki.join("server.crt"));

    let mut grown = config(&dir);
    grown.hosts.push(Host::new("node4", "10.0.0.4").with_role(Role::ControlPlane));
    let report = run_certs(grown).await;

    assert_eq!(output(&report, 1), "success");
    assert_eq!(read(&pki.join("server.crt")), server_before);
}

/// Policy Always replaces the files, after which IfNotPresent reuses them
#[tokio::test]
async fn test_always_policy_replaces_certificate() {
    let dir = TempDir::new().unwrap();
    run_certs(config(&dir)).await;

    let pki = dir.path().join("pki");
    let path = |file: &str| pki.join(file).to_string_lossy().into_owned();
    let server_before = read(&pki.join("server.crt"));

    let args = json!({
        "root_key": path("root.key"),
        "root_cert": path("root.crt"),
        "cn": "kube-apiserver",
        "policy": "Always",
        "date": "8760h",
        "is_ca": false,
        "sans": ["node1", "node4", "10.0.0.1", "10.0.0.4"],
        "out_key": path("server.key"),
        "out_cert": path("server.crt"),
    });
    let connector = Arc::new(RecordingConnector::new());
    let mut config = config(&dir);
    config.hosts.push(Host::new("node4", "10.0.0.4").with_role(Role::ControlPlane));
    let mut pipeline = Pipeline::new("reissue", runtime(config.clone(), &connector)).module(
        Module::new("Reissue").task(Task::new("reissue server", GenCert::new(args)).on(HostSelector::Local)),
    );

    let report = pipeline.start().await.unwrap();
    assert_eq!(output(&report, 0), "success");
    assert_ne!(read(&pki.join("server.crt")), server_before);

    let report = run_certs(config).await;
    assert_eq!(output(&report, 1), "skip");
}

#[tokio::test]
async fn test_invalid_policy_fails_the_task() {
    let dir = TempDir::new().unwrap();
    let args: Value = json!({
        "cn": "x",
        "policy": "Sometimes",
        "out_key": dir.path().join("x.key").to_string_lossy(),
        "out_cert": dir.path().join("x.crt").to_string_lossy(),
    });
    let connector = Arc::new(RecordingConnector::new());
    let mut pipeline = Pipeline::new("bad", runtime(config(&dir), &connector))
        .module(Module::new("Gen").task(Task::new("gen", GenCert::new(args)).on(HostSelector::Local)));

    let err = pipeline.start().await.unwrap_err();
    assert!(err.to_string().contains("\"policy\" should be one of [Always, IfNotPresent]"));
    assert!(!dir.path().join("x.crt").exists());
}

/// A kubeadm-style CA with a PKCS#1 key is kept and signs the server certificate
#[tokio::test]
async fn test_existing_pkcs1_root_is_used_as_signer() {
    let dir = TempDir::new().unwrap();
    let pki = dir.path().join("pki");
    fs::create_dir_all(&pki).unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/pki");
    fs::copy(fixtures.join("rsa-root.key"), pki.join("root.key")).unwrap();
    fs::copy(fixtures.join("rsa-root.crt"), pki.join("root.crt")).unwrap();
    let root_before = read(&pki.join("root.crt"));

    let report = run_certs(config(&dir)).await;
    assert_eq!(output(&report, 1), "success");
    assert_eq!(read(&pki.join("root.crt")), root_before);
    assert_eq!(check_expiration(&pki.join("root.crt")).unwrap().common_name, "legacy-rsa-root");

    let report = run_certs(config(&dir)).await;
    assert_eq!(output(&report, 1), "skip");
}
