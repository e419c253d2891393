//! Container runtime install, uninstall and registry login

use crate::action::{DisableService, EnableService, RegistryLogin, SyncBinary};
use crate::core::config::{ContainerManager, ExecutionSettings};
use crate::execution::{ContainerManagerIs, KubeVersionAtLeast, Module, Task};
use crate::phases::remote_task;

/// Sync and start docker, plus cri-dockerd from Kubernetes v1.24
pub fn install_docker_module(settings: &ExecutionSettings) -> Module {
    let cri = KubeVersionAtLeast { major: 1, minor: 24 };
    let tuned = |task: Task| remote_task(task, settings);

    Module::new("InstallDocker")
        .skip_when(|config, _| config.kubernetes.container_manager != ContainerManager::Docker)
        .task(tuned(Task::new("sync docker binaries", SyncBinary::docker())))
        .task(tuned(Task::new("sync cri-dockerd binaries", SyncBinary::cri_dockerd()).when(cri)))
        .task(tuned(Task::new("enable containerd for docker", EnableService::new("containerd"))))
        .task(tuned(Task::new("enable docker", EnableService::docker())))
        .task(tuned(Task::new("enable cri-docker", EnableService::cri_docker()).when(cri)))
        .task(tuned(Task::new("docker login registries", RegistryLogin::new())))
}

/// Sync containerd and crictl, then start containerd with runc
pub fn install_containerd_module(settings: &ExecutionSettings) -> Module {
    let tuned = |task: Task| remote_task(task, settings);

    Module::new("InstallContainerd")
        .skip_when(|config, _| config.kubernetes.container_manager != ContainerManager::Containerd)
        .task(tuned(Task::new("sync containerd binaries", SyncBinary::containerd())))
        .task(tuned(Task::new("sync crictl binaries", SyncBinary::crictl())))
        .task(tuned(Task::new("enable containerd", EnableService::containerd())))
}

/// Stop the configured runtime and remove its files
pub fn uninstall_module(settings: &ExecutionSettings) -> Module {
    let tuned = |task: Task| remote_task(task, settings);

    Module::new("UninstallContainerRuntime")
        .task(tuned(
            Task::new("disable docker", DisableService::docker())
                .when(ContainerManagerIs(ContainerManager::Docker)),
        ))
        .task(tuned(
            Task::new("disable containerd", DisableService::containerd())
                .when(ContainerManagerIs(ContainerManager::Containerd)),
        ))
}

/// Log every host into the configured registries
pub fn registry_login_module(settings: &ExecutionSettings) -> Module {
    Module::new("RegistryLogin")
        .skip_when(|config, _| config.registry.auths.is_empty())
        .task(remote_task(Task::new("docker login registries", RegistryLogin::new()), settings))
}
