//! Per-host predicates deciding whether a task runs on a host

use crate::action::upgrade::kubelet_version_key;
use crate::action::ActionError;
use crate::core::config::{parse_kube_version, ContainerManager};
use crate::core::runtime::HostRuntime;

/// Predicate evaluated for each targeted host before dispatch
///
/// `Ok(false)` skips the host; an error fails it without running the action.
pub trait Condition: Send + Sync {
    fn check(&self, runtime: &HostRuntime) -> Result<bool, ActionError>;
}

impl<F> Condition for F
where
    F: Fn(&HostRuntime) -> Result<bool, ActionError> + Send + Sync,
{
    fn check(&self, runtime: &HostRuntime) -> Result<bool, ActionError> {
        self(runtime)
    }
}

/// Kubernetes version is at least `major.minor`
#[derive(Debug, Clone, Copy)]
pub struct KubeVersionAtLeast {
    pub major: u64,
    pub minor: u64,
}

impl Condition for KubeVersionAtLeast {
    fn check(&self, runtime: &HostRuntime) -> Result<bool, ActionError> {
        Ok(runtime.cluster().kubernetes.is_at_least(self.major, self.minor))
    }
}

/// Configured container manager matches
#[derive(Debug, Clone, Copy)]
pub struct ContainerManagerIs(pub ContainerManager);

impl Condition for ContainerManagerIs {
    fn check(&self, runtime: &HostRuntime) -> Result<bool, ActionError> {
        Ok(runtime.cluster().kubernetes.container_manager == self.0)
    }
}

/// A boolean cache entry equals `expected`; a missing entry is an error
#[derive(Debug, Clone)]
pub struct CacheFlag {
    pub key: String,
    pub expected: bool,
}

impl CacheFlag {
    pub fn is_set(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expected: true,
        }
    }
}

impl Condition for CacheFlag {
    fn check(&self, runtime: &HostRuntime) -> Result<bool, ActionError> {
        Ok(runtime.cache().get_flag(&self.key)? == self.expected)
    }
}

/// The kubelet version recorded for the host is below the configured target
///
/// A host without a recorded version is an error.
#[derive(Debug, Clone, Copy)]
pub struct NeedsUpgrade;

impl Condition for NeedsUpgrade {
    fn check(&self, runtime: &HostRuntime) -> Result<bool, ActionError> {
        let recorded = runtime
            .cache()
            .get_text(&kubelet_version_key(&runtime.remote_host().name))?;
        let current = parse_kube_version(&recorded).map_err(|e| {
            ActionError::InvalidArgument(format!("invalid kubelet version \"{}\": {}", recorded, e))
        })?;
        let target = runtime
            .cluster()
            .kubernetes
            .semver()
            .map_err(|e| ActionError::InvalidArgument(e.to_string()))?;
        Ok(current < target)
    }
}
