//! Cluster configuration from YAML

use crate::core::host::{Host, Role, LOCAL_HOST};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level cluster specification loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClusterConfig {
    /// Cluster name
    pub name: String,

    /// Target host inventory
    #[serde(default)]
    pub hosts: Vec<Host>,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Cluster-wide variables available to every host
    #[serde(default)]
    pub variables: Map<String, Value>,

    #[serde(default)]
    pub settings: ExecutionSettings,
}

/// Container runtime installed on cluster nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerManager {
    Docker,
    #[default]
    Containerd,
}

/// Kubernetes distribution running on the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KubernetesType {
    #[default]
    Kubernetes,
    K3s,
}

impl std::fmt::Display for KubernetesType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KubernetesType::Kubernetes => f.write_str("kubernetes"),
            KubernetesType::K3s => f.write_str("k3s"),
        }
    }
}

/// Kubernetes settings relevant to node preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Target version; `upgrade-nodes` moves nodes to it
    #[serde(default = "default_kube_version")]
    pub version: String,

    #[serde(default, rename = "type")]
    pub kube_type: KubernetesType,

    #[serde(default)]
    pub container_manager: ContainerManager,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            version: default_kube_version(),
            kube_type: KubernetesType::default(),
            container_manager: ContainerManager::default(),
        }
    }
}

/// Parse a Kubernetes version such as `v1.28.8`
pub fn parse_kube_version(raw: &str) -> std::result::Result<semver::Version, semver::Error> {
    semver::Version::parse(raw.trim().trim_start_matches('v'))
}

fn default_kube_version() -> String {
    "v1.28.8".to_string()
}

impl KubernetesConfig {
    /// Parse the version, tolerating a leading `v`
    pub fn semver(&self) -> Result<semver::Version> {
        parse_kube_version(&self.version)
            .with_context(|| format!("Invalid Kubernetes version '{}'", self.version))
    }

    /// Whether the configured version is at least `major.minor`
    pub fn is_at_least(&self, major: u64, minor: u64) -> bool {
        self.semver()
            .map(|v| (v.major, v.minor) >= (major, minor))
            .unwrap_or(false)
    }
}

/// Image registry settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Container runtime data directory override
    #[serde(default)]
    pub data_root: Option<String>,

    /// Credentials keyed by registry address
    #[serde(default)]
    pub auths: BTreeMap<String, RegistryAuth>,
}

/// Credentials for one registry
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RegistryAuth {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// Where offline artifacts live and which versions to ship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Fail registration when an artifact is missing locally
    #[serde(default)]
    pub verify_local: bool,

    #[serde(default = "default_docker_version")]
    pub docker: String,

    #[serde(default = "default_cri_dockerd_version")]
    pub cri_dockerd: String,

    #[serde(default = "default_containerd_version")]
    pub containerd: String,

    #[serde(default = "default_crictl_version")]
    pub crictl: String,

    #[serde(default = "default_runc_version")]
    pub runc: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            verify_local: false,
            docker: default_docker_version(),
            cri_dockerd: default_cri_dockerd_version(),
            containerd: default_containerd_version(),
            crictl: default_crictl_version(),
            runc: default_runc_version(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./kubekey")
}

fn default_docker_version() -> String {
    "24.0.9".to_string()
}

fn default_cri_dockerd_version() -> String {
    "0.3.10".to_string()
}

fn default_containerd_version() -> String {
    "1.7.13".to_string()
}

fn default_crictl_version() -> String {
    "v1.29.0".to_string()
}

fn default_runc_version() -> String {
    "v1.1.12".to_string()
}

/// Engine-wide execution defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Extra attempts per host for retryable failures
    #[serde(default = "default_retries")]
    pub retries: usize,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Timeout applied to every remote command
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Cap on hosts running one task concurrently
    #[serde(default)]
    pub max_parallel_hosts: Option<usize>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            max_parallel_hosts: None,
        }
    }
}

fn default_retries() -> usize {
    2
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_command_timeout_secs() -> u64 {
    300
}

impl ClusterConfig {
    /// Build an in-memory configuration, mostly for tests and embedding
    pub fn new(name: impl Into<String>, hosts: Vec<Host>) -> Self {
        Self {
            name: name.into(),
            hosts,
            ..Self::default()
        }
    }

    /// Load cluster configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse cluster configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClusterConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the cluster configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Cluster name must not be empty");
        }

        if self.hosts.is_empty() {
            anyhow::bail!("Cluster '{}' has no hosts", self.name);
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name == LOCAL_HOST {
                anyhow::bail!("Host name '{}' is reserved", LOCAL_HOST);
            }
            if !seen.insert(&host.name) {
                anyhow::bail!("Duplicate host name: {}", host.name);
            }
            if host.address.trim().is_empty() {
                anyhow::bail!("Host '{}' has an empty address", host.name);
            }
        }

        self.kubernetes.semver()?;

        if self.settings.max_parallel_hosts == Some(0) {
            anyhow::bail!("settings.max_parallel_hosts must be at least 1");
        }

        Ok(())
    }

    /// Hosts carrying the given role, in inventory order
    pub fn hosts_with_role(&self, role: Role) -> impl Iterator<Item = &Host> {
        self.hosts.iter().filter(move |h| h.has_role(role))
    }
}
