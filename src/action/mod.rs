//! Actions - the smallest unit of work run on one host
//!
//! An action receives a [`HostRuntime`] and returns the stdout-like output
//! of what it did. Everything it needs beyond its own parameters (cluster
//! config, cache, variables, the runner) comes through that view.

pub mod artifacts;
pub mod binaries;
pub mod cert;
pub mod command;
pub mod debug;
pub mod registry;
pub mod service;
pub mod upgrade;

use crate::connector::{ConnectorError, Runner};
use crate::core::cache::CacheError;
use crate::core::runtime::HostRuntime;
use crate::core::variable::VariableError;
use async_trait::async_trait;
use thiserror::Error;

pub use artifacts::{ArtifactSet, RegisterBinaries};
pub use binaries::{InstallRecipe, SyncBinary};
pub use cert::{CertExpiration, GenCert};
pub use command::ShellCommand;
pub use debug::Inspect;
pub use registry::RegistryLogin;
pub use service::{DisableService, EnableService};
pub use upgrade::{CheckClusterType, KubeletVersion};

/// Scratch directory on target hosts
pub const TMP_DIR: &str = "/tmp/kubekey/";

/// Errors returned by actions
#[derive(Debug, Error)]
pub enum ActionError {
    /// A required cache entry is missing or has the wrong shape
    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    /// Arguments or other preconditions are unusable
    #[error("{0}")]
    InvalidArgument(String),

    /// A command or copy failed; `context` names the intended operation
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: ConnectorError,
    },

    #[error("{context}: {reason}")]
    Certificate { context: String, reason: String },
}

impl ActionError {
    /// Only transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Transport { .. })
    }

    pub fn certificate(context: impl Into<String>, reason: impl ToString) -> Self {
        ActionError::Certificate {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// Attach the intended operation to a transport failure
pub trait StepContext<T> {
    fn step(self, context: impl Into<String>) -> Result<T, ActionError>;
}

impl<T> StepContext<T> for Result<T, ConnectorError> {
    fn step(self, context: impl Into<String>) -> Result<T, ActionError> {
        self.map_err(|source| ActionError::Transport {
            context: context.into(),
            source,
        })
    }
}

/// A unit of work executed on a single host
#[async_trait]
pub trait Action: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError>;
}

/// Recreate the scratch directory on the host
pub async fn reset_tmp_dir(runner: &Runner) -> Result<(), ActionError> {
    runner
        .sudo_cmd(
            "if [ -d /tmp/kubekey ]; then rm -rf /tmp/kubekey ;fi && mkdir -m 777 -p /tmp/kubekey",
            false,
        )
        .await
        .step("reset tmp dir failed")?;
    Ok(())
}
