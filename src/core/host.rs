//! Host inventory model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Name of the synthetic host representing the orchestrating machine
pub const LOCAL_HOST: &str = "LocalHost";

/// CPU architecture of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    Amd64,
    Arm64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a host plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    ControlPlane,
    Worker,
    Etcd,
    Registry,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ControlPlane => "control-plane",
            Role::Worker => "worker",
            Role::Etcd => "etcd",
            Role::Registry => "registry",
        }
    }
}

/// A target machine. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Unique inventory name
    pub name: String,

    /// Address used to reach the host
    pub address: String,

    /// Address used for intra-cluster traffic (defaults to `address`)
    #[serde(default)]
    pub internal_address: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    /// SSH private key used for this host
    #[serde(default)]
    pub identity_file: Option<String>,

    #[serde(default)]
    pub arch: Arch,

    #[serde(default)]
    pub roles: BTreeSet<Role>,

    /// Host-scoped variables, overriding cluster-wide ones
    #[serde(default)]
    pub vars: serde_json::Map<String, serde_json::Value>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            internal_address: None,
            port: default_port(),
            user: default_user(),
            identity_file: None,
            arch: Arch::default(),
            roles: BTreeSet::new(),
            vars: serde_json::Map::new(),
        }
    }

    /// The synthetic entry for the machine running the orchestrator
    pub fn local() -> Self {
        Self::new(LOCAL_HOST, "127.0.0.1")
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn internal_address(&self) -> &str {
        self.internal_address.as_deref().unwrap_or(&self.address)
    }

    /// Whether commands for this host run on the orchestrating machine
    pub fn is_local(&self) -> bool {
        self.name == LOCAL_HOST
            || matches!(self.address.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

/// Which hosts of the inventory a task targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSelector {
    /// Every inventory host
    All,
    /// Hosts carrying at least one of the roles
    Roles(Vec<Role>),
    /// Hosts with exactly these names, in inventory order
    Names(Vec<String>),
    /// Only the orchestrating machine
    Local,
}

impl HostSelector {
    pub fn matches(&self, host: &Host) -> bool {
        match self {
            HostSelector::All => true,
            HostSelector::Roles(roles) => roles.iter().any(|r| host.has_role(*r)),
            HostSelector::Names(names) => names.iter().any(|n| n == &host.name),
            HostSelector::Local => host.name == LOCAL_HOST,
        }
    }
}
