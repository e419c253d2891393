//! Move control-plane and worker nodes to the configured Kubernetes version

use crate::action::upgrade::kubelet_version_key;
use crate::action::{
    ActionError, CheckClusterType, EnableService, KubeletVersion, RegisterBinaries, ShellCommand,
    SyncBinary,
};
use crate::core::cache::PipelineCache;
use crate::core::config::{parse_kube_version, ClusterConfig, ExecutionSettings};
use crate::core::host::{HostSelector, Role};
use crate::core::runtime::HostRuntime;
use crate::execution::{Condition, Module, NeedsUpgrade, Task};
use crate::phases::remote_task;

fn nodes() -> HostSelector {
    HostSelector::Roles(vec![Role::ControlPlane, Role::Worker])
}

/// Whether some node recorded a kubelet older than the target
///
/// A node with no recorded version counts as behind.
fn any_node_behind(config: &ClusterConfig, cache: &PipelineCache) -> bool {
    let Ok(target) = config.kubernetes.semver() else {
        return true;
    };
    config.hosts.iter().filter(|host| nodes().matches(host)).any(|host| {
        cache
            .get_text(&kubelet_version_key(&host.name))
            .ok()
            .and_then(|raw| parse_kube_version(&raw).ok())
            .map_or(true, |current| current < target)
    })
}

/// Reject unsupported distributions, then record and validate each kubelet
pub fn precheck_module(settings: &ExecutionSettings) -> Module {
    Module::new("UpgradePreCheck")
        .task(Task::new("check cluster type", CheckClusterType).on(HostSelector::Local))
        .task(remote_task(
            Task::new("get kubelet version", KubeletVersion).on(nodes()),
            settings,
        ))
}

/// Ship the new binaries and roll nodes one at a time, control plane first
pub fn upgrade_module(settings: &ExecutionSettings) -> Module {
    let tuned = |task: Task| remote_task(task.on(nodes()).when(NeedsUpgrade), settings);
    let worker_only = |runtime: &HostRuntime| -> Result<bool, ActionError> {
        Ok(!runtime.remote_host().has_role(Role::ControlPlane) && NeedsUpgrade.check(runtime)?)
    };
    let kubeadm = || ShellCommand::new("kubeadm upgrade node", "/usr/local/bin/kubeadm upgrade node");

    Module::new("UpgradeNodes")
        .skip_when(|config, cache| !any_node_behind(config, cache))
        .task(Task::new("register kube binaries", RegisterBinaries::kubernetes()).on(HostSelector::Local))
        .task(tuned(Task::new("sync kubeadm binaries", SyncBinary::kubeadm())))
        .task(tuned(Task::new("sync kubelet binaries", SyncBinary::kubelet())))
        .task(tuned(Task::new("sync kubectl binaries", SyncBinary::kubectl())))
        .task(tuned(Task::new("upgrade control-plane nodes", kubeadm()))
            .on(HostSelector::Roles(vec![Role::ControlPlane]))
            .serial())
        .task(remote_task(
            Task::new("upgrade worker nodes", kubeadm())
                .on(HostSelector::Roles(vec![Role::Worker]))
                .when(worker_only)
                .serial(),
            settings,
        ))
        .task(tuned(Task::new("restart kubelet", EnableService::kubelet())).serial())
}
