//! Checks run before nodes move to a new Kubernetes version

use crate::action::{Action, ActionError, StepContext};
use crate::core::cache::CacheValue;
use crate::core::config::{parse_kube_version, KubernetesType};
use crate::core::runtime::HostRuntime;
use async_trait::async_trait;
use semver::Version;
use tracing::info;

/// Cache key holding the kubelet version found on `host`
pub fn kubelet_version_key(host: &str) -> String {
    format!("KubeletVersion-{}", host)
}

/// Extract the version from `kubelet --version` output (`Kubernetes v1.27.3`)
pub fn parse_kubelet_version(output: &str) -> Result<Version, String> {
    let raw = output
        .split_whitespace()
        .find(|word| word.starts_with('v'))
        .ok_or_else(|| format!("unexpected kubelet version output \"{}\"", output.trim()))?;
    parse_kube_version(raw).map_err(|e| format!("invalid kubelet version \"{}\": {}", raw, e))
}

/// Whether `current` must move to `target`
///
/// Downgrades and jumps over a minor version are refused.
pub fn upgrade_needed(current: &Version, target: &Version) -> Result<bool, String> {
    if current > target {
        return Err(format!("cannot downgrade from v{} to v{}", current, target));
    }
    if target.major != current.major || target.minor > current.minor + 1 {
        return Err(format!(
            "upgrading from v{} to v{} skips a minor version",
            current, target
        ));
    }
    Ok(current < target)
}

/// Refuse clusters whose distribution the upgrade does not handle
#[derive(Debug, Clone, Default)]
pub struct CheckClusterType;

#[async_trait]
impl Action for CheckClusterType {
    fn name(&self) -> &str {
        "check-cluster-type"
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        match runtime.cluster().kubernetes.kube_type {
            KubernetesType::Kubernetes => Ok(KubernetesType::Kubernetes.to_string()),
            other => Err(ActionError::InvalidArgument(format!(
                "unsupported cluster kubernetes type: {}",
                other
            ))),
        }
    }
}

/// Record the node's kubelet version and validate the path to the target
#[derive(Debug, Clone, Default)]
pub struct KubeletVersion;

#[async_trait]
impl Action for KubeletVersion {
    fn name(&self) -> &str {
        "kubelet-version"
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let host = runtime.remote_host();
        let output = runtime
            .runner()
            .sudo_cmd("/usr/local/bin/kubelet --version", false)
            .await
            .step("get kubelet version failed")?;

        let current = parse_kubelet_version(&output).map_err(ActionError::InvalidArgument)?;
        let target = runtime
            .cluster()
            .kubernetes
            .semver()
            .map_err(|e| ActionError::InvalidArgument(e.to_string()))?;
        let needed = upgrade_needed(&current, &target)
            .map_err(|e| ActionError::InvalidArgument(format!("{}: {}", host.name, e)))?;

        info!(
            "[{}] kubelet v{}, target v{}, upgrade needed: {}",
            host.name, current, target, needed
        );
        runtime
            .cache()
            .set(kubelet_version_key(&host.name), CacheValue::Text(current.to_string()));
        Ok(format!("v{}", current))
    }
}
