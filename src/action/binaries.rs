//! Ship a staged binary to a host and install it

use crate::action::{reset_tmp_dir, Action, ActionError, StepContext, TMP_DIR};
use crate::core::runtime::HostRuntime;
use async_trait::async_trait;
use tracing::info;

/// How an uploaded artifact becomes an installed binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallRecipe {
    /// Extract the tarball and move `dir/*` into `/usr/bin`
    ExtractMove { dir: &'static str },
    /// Extract the tarball straight into `target`
    ExtractInto { target: &'static str },
    /// Install a single executable at `target`
    Executable { target: &'static str },
}

impl InstallRecipe {
    /// Privileged shell command installing the artifact at `archive`
    pub fn command(&self, archive: &str) -> String {
        match self {
            InstallRecipe::ExtractMove { dir } => format!(
                "mkdir -p /usr/bin && tar -zxf {archive} && mv {dir}/* /usr/bin && rm -rf {dir}"
            ),
            InstallRecipe::ExtractInto { target } => {
                format!("mkdir -p {target} && tar -zxf {archive} -C {target} ")
            }
            InstallRecipe::Executable { target } => format!("install -m 755 {archive} {target}"),
        }
    }
}

/// Copy a binary registered in the cache to the host and install it
#[derive(Debug, Clone)]
pub struct SyncBinary {
    id: String,
    label: String,
    recipe: InstallRecipe,
}

impl SyncBinary {
    pub fn new(id: impl Into<String>, label: impl Into<String>, recipe: InstallRecipe) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            recipe,
        }
    }

    pub fn docker() -> Self {
        Self::new(
            "docker",
            "container runtime docker",
            InstallRecipe::ExtractMove { dir: "docker" },
        )
    }

    pub fn cri_dockerd() -> Self {
        Self::new(
            "cri-dockerd",
            "cri-dockerd",
            InstallRecipe::ExtractMove { dir: "cri-dockerd" },
        )
    }

    pub fn containerd() -> Self {
        Self::new(
            "containerd",
            "container runtime containerd",
            InstallRecipe::ExtractMove { dir: "bin" },
        )
    }

    pub fn crictl() -> Self {
        Self::new(
            "crictl",
            "crictl",
            InstallRecipe::ExtractInto { target: "/usr/bin" },
        )
    }

    pub fn runc() -> Self {
        Self::new(
            "runc",
            "runc",
            InstallRecipe::Executable {
                target: "/usr/local/sbin/runc",
            },
        )
    }

    pub fn kubeadm() -> Self {
        Self::new("kubeadm", "kubeadm", InstallRecipe::Executable { target: "/usr/local/bin/kubeadm" })
    }

    pub fn kubelet() -> Self {
        Self::new("kubelet", "kubelet", InstallRecipe::Executable { target: "/usr/local/bin/kubelet" })
    }

    pub fn kubectl() -> Self {
        Self::new("kubectl", "kubectl", InstallRecipe::Executable { target: "/usr/local/bin/kubectl" })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reset scratch, upload, install. Returns the install output.
    pub(crate) async fn sync(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let host = runtime.remote_host();
        let binary = runtime.cache().binary(host.arch, &self.id)?;
        let runner = runtime.runner();

        reset_tmp_dir(runner).await?;

        let dst = format!("{}{}", TMP_DIR, binary.file_name);
        runner
            .scp(&binary.path(), &dst)
            .await
            .step(format!("sync {} binaries failed", self.id))?;

        let output = runner
            .sudo_cmd(&self.recipe.command(&dst), false)
            .await
            .step(format!("install {} binaries failed", self.label))?;

        info!("[{}] installed {} {}", host.name, self.id, binary.version);
        Ok(output)
    }
}

#[async_trait]
impl Action for SyncBinary {
    fn name(&self) -> &str {
        &self.id
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        self.sync(runtime).await
    }
}
