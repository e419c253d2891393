//! Transport to target hosts
//!
//! A [`Connector`] runs commands and copies files on any inventory host.
//! Actions never talk to it directly; they go through a per-host
//! [`Runner`] that applies the ignore-errors policy and turns exit codes
//! into typed errors.

pub mod ssh;

use crate::core::host::Host;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use ssh::SshConnector;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Transport failures
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("command `{command}` on {host} exited with code {code}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("copy {local} to {host}:{remote} failed: {reason}")]
    CopyFailed {
        host: String,
        local: String,
        remote: String,
        reason: String,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timeout after {0} seconds")]
    Timeout(u64),
}

/// Remote execution capability shared by every host of a run
#[async_trait]
pub trait Connector: Send + Sync {
    /// Run a shell command, optionally with root privileges
    async fn exec(
        &self,
        host: &Host,
        command: &str,
        privileged: bool,
    ) -> Result<CommandOutput, ConnectorError>;

    /// Copy a local file to a path on the host
    async fn copy(&self, host: &Host, local: &Path, remote: &str) -> Result<(), ConnectorError>;
}

/// Command execution bound to one host
#[derive(Clone)]
pub struct Runner {
    host: Host,
    connector: Arc<dyn Connector>,
}

impl Runner {
    pub fn new(host: Host, connector: Arc<dyn Connector>) -> Self {
        Self { host, connector }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Run a privileged command and return its trimmed stdout
    ///
    /// With `ignore_errors` a non-zero exit is treated as success and the
    /// captured output is still returned.
    pub async fn sudo_cmd(&self, command: &str, ignore_errors: bool) -> Result<String, ConnectorError> {
        self.run(command, true, ignore_errors).await
    }

    /// Run an unprivileged command and return its trimmed stdout
    pub async fn cmd(&self, command: &str, ignore_errors: bool) -> Result<String, ConnectorError> {
        self.run(command, false, ignore_errors).await
    }

    /// Copy a local file onto the host
    pub async fn scp(&self, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        debug!("[{}] copy {} -> {}", self.host.name, local.display(), remote);
        self.connector.copy(&self.host, local, remote).await
    }

    async fn run(
        &self,
        command: &str,
        privileged: bool,
        ignore_errors: bool,
    ) -> Result<String, ConnectorError> {
        debug!("[{}] exec: {}", self.host.name, command);
        let output = self.connector.exec(&self.host, command, privileged).await?;

        if !output.success() {
            if !ignore_errors {
                return Err(ConnectorError::CommandFailed {
                    host: self.host.name.clone(),
                    command: command.to_string(),
                    code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            debug!(
                "[{}] ignoring exit code {} of `{}`",
                self.host.name, output.exit_code, command
            );
        }

        Ok(output.stdout.trim_end().to_string())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").field("host", &self.host.name).finish()
    }
}
