//! Named pipelines assembled from the built-in actions

pub mod artifacts;
pub mod certs;
pub mod container;
pub mod nodes;

use crate::core::config::ExecutionSettings;
use crate::core::runtime::Runtime;
use crate::execution::{Pipeline, Task};
use std::fmt;
use std::time::Duration;

/// The pipelines the CLI can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    InstallRuntime,
    UninstallRuntime,
    RegistryLogin,
    Certs,
    UpgradeNodes,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::InstallRuntime => "install-runtime",
            PipelineKind::UninstallRuntime => "uninstall-runtime",
            PipelineKind::RegistryLogin => "registry-login",
            PipelineKind::Certs => "certs",
            PipelineKind::UpgradeNodes => "upgrade-nodes",
        }
    }

    /// Assemble the modules of this pipeline against `runtime`
    pub fn build(self, runtime: Runtime) -> Pipeline {
        let config = runtime.config().clone();
        let pipeline = Pipeline::new(self.as_str(), runtime);
        match self {
            PipelineKind::InstallRuntime => pipeline
                .module(artifacts::register_module())
                .module(container::install_docker_module(&config.settings))
                .module(container::install_containerd_module(&config.settings)),
            PipelineKind::UninstallRuntime => {
                pipeline.module(container::uninstall_module(&config.settings))
            }
            PipelineKind::RegistryLogin => {
                pipeline.module(container::registry_login_module(&config.settings))
            }
            PipelineKind::Certs => pipeline.module(certs::module(&config)),
            PipelineKind::UpgradeNodes => pipeline
                .module(nodes::precheck_module(&config.settings))
                .module(nodes::upgrade_module(&config.settings)),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply the configured retry and parallelism defaults to a remote task
pub(crate) fn remote_task(task: Task, settings: &ExecutionSettings) -> Task {
    let task = task.retry(settings.retries, Duration::from_secs(settings.retry_delay_secs));
    match settings.max_parallel_hosts {
        Some(limit) => task.concurrency(limit),
        None => task,
    }
}
