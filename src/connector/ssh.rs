//! SSH connector - shells out to `ssh`/`scp`, or runs locally for loopback hosts

use crate::connector::{CommandOutput, Connector, ConnectorError};
use crate::core::host::Host;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Connector using the system OpenSSH client
#[derive(Debug, Clone)]
pub struct SshConnector {
    /// Timeout for each spawned process in seconds
    timeout_secs: u64,

    /// Key used for hosts without their own identity file
    default_identity: Option<PathBuf>,
}

impl SshConnector {
    /// Create a connector with the given per-command timeout
    ///
    /// Falls back to `~/.ssh/id_rsa` when it exists and a host names no
    /// identity file of its own.
    pub fn new(timeout_secs: u64) -> Self {
        let default_identity = dirs::home_dir()
            .map(|home| home.join(".ssh").join("id_rsa"))
            .filter(|path| path.exists());
        Self {
            timeout_secs,
            default_identity,
        }
    }

    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_identity = Some(path.into());
        self
    }

    fn identity_for(&self, host: &Host) -> Option<String> {
        host.identity_file
            .clone()
            .or_else(|| self.default_identity.as_ref().map(|p| p.display().to_string()))
    }

    /// Options shared by `ssh` and `scp` for non-interactive use
    fn common_args(&self, host: &Host) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(identity) = self.identity_for(host) {
            args.push("-i".to_string());
            args.push(identity);
        }
        for option in [
            "BatchMode=yes",
            "ConnectTimeout=10",
            "ServerAliveInterval=15",
            "ServerAliveCountMax=3",
            "StrictHostKeyChecking=accept-new",
        ] {
            args.push("-o".to_string());
            args.push(option.to_string());
        }
        args
    }

    fn ssh_args(&self, host: &Host, command: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), host.port.to_string()];
        args.extend(self.common_args(host));
        args.push(format!("{}@{}", host.user, host.address));
        args.push(command.to_string());
        args
    }

    fn scp_args(&self, host: &Host, local: &Path, remote: &str) -> Vec<String> {
        let mut args = vec!["-P".to_string(), host.port.to_string()];
        args.extend(self.common_args(host));
        args.push(local.display().to_string());
        args.push(format!("{}@{}:{}", host.user, host.address, remote));
        args
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<CommandOutput, ConnectorError> {
        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| ConnectorError::Timeout(self.timeout_secs))?;

        let output = result.map_err(|source| ConnectorError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("{} returned {} bytes of output", program, stdout.len());

        Ok(CommandOutput {
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Wrap a command so it runs as root through a login-free bash
pub fn sudo_prefix(command: &str) -> String {
    format!("sudo -E /bin/bash -c \"{}\"", command.replace('"', "\\\""))
}

#[async_trait]
impl Connector for SshConnector {
    async fn exec(
        &self,
        host: &Host,
        command: &str,
        privileged: bool,
    ) -> Result<CommandOutput, ConnectorError> {
        let command = if privileged {
            sudo_prefix(command)
        } else {
            command.to_string()
        };

        let output = if host.is_local() {
            self.spawn("sh", &["-c".to_string(), command]).await?
        } else {
            self.spawn("ssh", &self.ssh_args(host, &command)).await?
        };

        if !output.success() {
            warn!(
                "[{}] command exited with code {}: {}",
                host.name,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    async fn copy(&self, host: &Host, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        let output = if host.is_local() {
            self.spawn("cp", &["-f".to_string(), local.display().to_string(), remote.to_string()])
                .await?
        } else {
            self.spawn("scp", &self.scp_args(host, local, remote)).await?
        };

        if output.success() {
            Ok(())
        } else {
            Err(ConnectorError::CopyFailed {
                host: host.name.clone(),
                local: local.display().to_string(),
                remote: remote.to_string(),
                reason: output.stderr.trim().to_string(),
            })
        }
    }
}
