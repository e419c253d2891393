//! Test: registry login phase

use crate::helpers::*;
use kubefleet::core::config::{ContainerManager, RegistryAuth};
use kubefleet::{ClusterConfig, PipelineKind};
use std::sync::Arc;

fn with_auths(entries: &[(&str, &str, &str)]) -> ClusterConfig {
    let mut config = cluster(ContainerManager::Docker);
    config.settings.retries = 0;
    for (registry, username, password) in entries {
        config.registry.auths.insert(
            registry.to_string(),
            RegistryAuth {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
    }
    config
}

#[tokio::test]
async fn test_login_escapes_credentials_and_copies_auths() {
    let connector = Arc::new(RecordingConnector::new().reply("if [ -e $HOME/.docker/config.json ]", "exist"));
    let config = with_auths(&[("hub.local:5000", "admin", "p$ss&w*rd"), ("mirror.local", "admin", "")]);
    let mut pipeline = PipelineKind::RegistryLogin.build(runtime(config, &connector));

    pipeline.start().await.unwrap();

    for host in ["node1", "node2", "node3"] {
        assert_ran(
            &connector,
            host,
            r"HOME=$HOME docker login --username 'admin' --password 'p\$ss\&w\*rd' hub.local:5000",
        );
        assert_not_ran(&connector, host, "mirror.local");
        assert_ran(&connector, host, "chmod 0644 /.docker/config.json");
    }
}

#[tokio::test]
async fn test_auth_file_copied_only_when_present() {
    let connector = Arc::new(RecordingConnector::new());
    let config = with_auths(&[("hub.local", "admin", "secret")]);
    let mut pipeline = PipelineKind::RegistryLogin.build(runtime(config, &connector));

    pipeline.start().await.unwrap();

    assert_ran(&connector, "node1", "docker login --username 'admin' --password 'secret' hub.local");
    assert_not_ran(&connector, "node1", "chmod 0644");
}

#[tokio::test]
async fn test_login_failure_aborts() {
    let connector = Arc::new(RecordingConnector::new().fail_on_host("node2", "docker login"));
    let config = with_auths(&[("hub.local", "admin", "secret")]);
    let mut pipeline = PipelineKind::RegistryLogin.build(runtime(config, &connector));

    let err = pipeline.start().await.unwrap_err();
    assert!(err.to_string().contains("login registry failed, cmd: docker login hub.local"));
    assert!(err.to_string().contains("node2"));
}

#[tokio::test]
async fn test_no_auths_skips_module() {
    let connector = Arc::new(RecordingConnector::new());
    let mut pipeline = PipelineKind::RegistryLogin.build(runtime(with_auths(&[]), &connector));

    let report = pipeline.start().await.unwrap();
    assert_eq!(report.skipped_modules(), vec!["RegistryLogin"]);
    assert!(connector.calls().is_empty());
}
