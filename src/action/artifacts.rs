//! Register locally staged artifacts in the pipeline cache

use crate::action::{Action, ActionError};
use crate::core::cache::{binaries_key, BinaryMap, CacheValue, KubeBinary};
use crate::core::config::{ClusterConfig, ContainerManager};
use crate::core::host::Arch;
use crate::core::runtime::HostRuntime;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Which group of artifacts a [`RegisterBinaries`] stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactSet {
    #[default]
    ContainerRuntime,
    /// kubeadm, kubelet and kubectl at the configured Kubernetes version
    Kubernetes,
}

/// Descriptors of the Kubernetes node binaries for `arch`
///
/// All three share `<work_dir>/kube/<version>/<arch>`.
pub fn kube_descriptors(config: &ClusterConfig, arch: Arch) -> Vec<KubeBinary> {
    let version = &config.kubernetes.version;
    let base_dir = config.artifacts.work_dir.join("kube").join(version).join(arch.as_str());
    ["kubeadm", "kubelet", "kubectl"]
        .into_iter()
        .map(|id| KubeBinary {
            id: id.to_string(),
            file_name: id.to_string(),
            arch,
            version: version.clone(),
            base_dir: base_dir.clone(),
        })
        .collect()
}

/// Descriptors of every artifact the configured runtime needs on `arch`
pub fn descriptors(config: &ClusterConfig, arch: Arch) -> Vec<KubeBinary> {
    let artifacts = &config.artifacts;
    let binary = |id: &str, version: &str, file_name: String| KubeBinary {
        id: id.to_string(),
        file_name,
        arch,
        version: version.to_string(),
        base_dir: artifacts
            .work_dir
            .join(id)
            .join(version)
            .join(arch.as_str()),
    };

    match config.kubernetes.container_manager {
        ContainerManager::Docker => {
            let mut list = vec![binary(
                "docker",
                &artifacts.docker,
                format!("docker-{}.tgz", artifacts.docker),
            )];
            if config.kubernetes.is_at_least(1, 24) {
                list.push(binary(
                    "cri-dockerd",
                    &artifacts.cri_dockerd,
                    format!("cri-dockerd-{}.tgz", artifacts.cri_dockerd),
                ));
            }
            list
        }
        ContainerManager::Containerd => vec![
            binary(
                "containerd",
                &artifacts.containerd,
                format!("containerd-{}-linux-{}.tar.gz", artifacts.containerd, arch),
            ),
            binary(
                "crictl",
                &artifacts.crictl,
                format!("crictl-{}-linux-{}.tar.gz", artifacts.crictl, arch),
            ),
            binary("runc", &artifacts.runc, format!("runc.{}", arch)),
        ],
    }
}

/// Store a `KubeBinaries-<arch>` map for every architecture in the inventory
///
/// Entries already registered under the same key are kept unless this set
/// replaces them.
#[derive(Debug, Clone, Default)]
pub struct RegisterBinaries {
    set: ArtifactSet,
}

impl RegisterBinaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kubernetes() -> Self {
        Self {
            set: ArtifactSet::Kubernetes,
        }
    }
}

#[async_trait]
impl Action for RegisterBinaries {
    fn name(&self) -> &str {
        "register-binaries"
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let config = runtime.cluster();
        let archs: BTreeSet<Arch> = config.hosts.iter().map(|h| h.arch).collect();

        let mut summary = Vec::new();
        for arch in archs {
            let key = binaries_key(arch);
            let mut map: BinaryMap = match runtime.cache().get_binaries(&key) {
                Ok(existing) => existing.as_ref().clone(),
                Err(_) => BinaryMap::new(),
            };
            let wanted = match self.set {
                ArtifactSet::ContainerRuntime => descriptors(config, arch),
                ArtifactSet::Kubernetes => kube_descriptors(config, arch),
            };
            for binary in wanted {
                if config.artifacts.verify_local && !binary.path().exists() {
                    return Err(ActionError::InvalidArgument(format!(
                        "artifact {} for {} not found at {}",
                        binary.id,
                        arch,
                        binary.path().display()
                    )));
                }
                map.insert(binary.id.clone(), binary);
            }

            info!("registered {} binaries under {}", map.len(), key);
            summary.push(format!("{}={}", key, map.len()));
            runtime.cache().set(key, CacheValue::Binaries(Arc::new(map)));
        }

        Ok(summary.join(" "))
    }
}
