//! Enable and tear down container runtime services

use crate::action::binaries::SyncBinary;
use crate::action::{Action, ActionError, StepContext};
use crate::core::config::ContainerManager;
use crate::core::runtime::HostRuntime;
use async_trait::async_trait;
use tracing::{debug, info};

/// Reload systemd, then enable and start a unit
#[derive(Debug, Clone)]
pub struct EnableService {
    service: String,
    install_runc: bool,
    restart: bool,
}

impl EnableService {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            install_runc: false,
            restart: false,
        }
    }

    /// containerd, then runc once the service is up
    pub fn containerd() -> Self {
        Self {
            install_runc: true,
            ..Self::new("containerd")
        }
    }

    /// kubelet, restarted so a replaced binary takes over
    pub fn kubelet() -> Self {
        Self {
            restart: true,
            ..Self::new("kubelet")
        }
    }

    pub fn docker() -> Self {
        Self::new("docker")
    }

    pub fn cri_docker() -> Self {
        Self::new("cri-docker")
    }

    pub fn command(&self) -> String {
        let verb = if self.restart { "restart" } else { "start" };
        format!(
            "systemctl daemon-reload && systemctl enable {0} && systemctl {1} {0}",
            self.service, verb
        )
    }
}

#[async_trait]
impl Action for EnableService {
    fn name(&self) -> &str {
        &self.service
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let output = runtime
            .runner()
            .sudo_cmd(&self.command(), false)
            .await
            .step(format!("enable and start {} failed", self.service))?;
        info!("[{}] {} enabled", runtime.remote_host().name, self.service);

        if self.install_runc {
            SyncBinary::runc().sync(runtime).await?;
        }
        Ok(output)
    }
}

/// Which runtime a [`DisableService`] removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Containerd,
}

/// Stop a container runtime and remove its files
///
/// Stopping is fatal on failure; file removal is best effort and each
/// path is attempted independently.
#[derive(Debug, Clone)]
pub struct DisableService {
    kind: RuntimeKind,
}

const DOCKER_FILES: &[&str] = &[
    "/usr/bin/runc",
    "/usr/bin/ctr",
    "/usr/bin/docker*",
    "/usr/bin/containerd*",
    "/etc/systemd/system/docker.service",
    "/etc/docker/daemon.json",
];

const CRI_DOCKER_UNIT: &str = "/etc/systemd/system/cri-docker.service";

const CONTAINERD_FILES: &[&str] = &[
    "/usr/local/sbin/runc",
    "/usr/bin/crictl",
    "/usr/bin/containerd*",
    "/usr/bin/ctr",
    "/etc/systemd/system/containerd.service",
    "/etc/containerd/config.toml",
    "/etc/crictl.yaml",
];

impl DisableService {
    pub fn docker() -> Self {
        Self {
            kind: RuntimeKind::Docker,
        }
    }

    pub fn containerd() -> Self {
        Self {
            kind: RuntimeKind::Containerd,
        }
    }

    fn service(&self) -> &'static str {
        match self.kind {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Containerd => "containerd",
        }
    }

    /// cri-dockerd only exists alongside docker from Kubernetes v1.24 on
    fn with_cri_docker(&self, runtime: &HostRuntime) -> bool {
        let kube = &runtime.cluster().kubernetes;
        self.kind == RuntimeKind::Docker
            && kube.container_manager == ContainerManager::Docker
            && kube.is_at_least(1, 24)
    }

    /// Paths removed after the service is stopped, in order
    pub fn cleanup_paths(&self, runtime: &HostRuntime) -> Vec<String> {
        let (files, default_data_dir) = match self.kind {
            RuntimeKind::Docker => (DOCKER_FILES, "/var/lib/docker"),
            RuntimeKind::Containerd => (CONTAINERD_FILES, "/var/lib/containerd"),
        };

        let mut paths: Vec<String> = files.iter().map(|p| p.to_string()).collect();
        if self.with_cri_docker(runtime) {
            paths.push(CRI_DOCKER_UNIT.to_string());
        }

        let data_dir = runtime
            .cluster()
            .registry
            .data_root
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| default_data_dir.to_string());
        paths.push(data_dir);
        paths
    }
}

#[async_trait]
impl Action for DisableService {
    fn name(&self) -> &str {
        self.service()
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let runner = runtime.runner();
        let service = self.service();

        runner
            .sudo_cmd(&format!("systemctl disable {0} && systemctl stop {0}", service), false)
            .await
            .step(format!("disable and stop {} failed", service))?;

        if self.with_cri_docker(runtime) {
            runner
                .sudo_cmd("systemctl disable cri-docker && systemctl stop cri-docker", false)
                .await
                .step("disable and stop cri-docker failed")?;
        }

        for path in self.cleanup_paths(runtime) {
            if let Err(err) = runner.sudo_cmd(&format!("rm -rf {}", path), true).await {
                debug!("[{}] failed to remove {}: {}", runtime.remote_host().name, path, err);
            }
        }

        info!("[{}] {} removed", runtime.remote_host().name, service);
        Ok(String::new())
    }
}
