//! Test utility functions for kubefleet

#![allow(dead_code)]

use async_trait::async_trait;
use kubefleet::core::config::ContainerManager;
use kubefleet::core::host::{Host, Role};
use kubefleet::execution::PipelineEvent;
use kubefleet::{ClusterConfig, CommandOutput, Connector, ConnectorError, Runtime};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One call observed by [`RecordingConnector`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Exec {
        host: String,
        command: String,
        privileged: bool,
    },
    Copy {
        host: String,
        local: PathBuf,
        remote: String,
    },
}

impl Call {
    pub fn host(&self) -> &str {
        match self {
            Call::Exec { host, .. } | Call::Copy { host, .. } => host,
        }
    }
}

struct Rule {
    host: Option<String>,
    pattern: String,
    /// Remaining failures; `None` fails forever
    remaining: Option<usize>,
    exit_code: i32,
}

struct Reply {
    host: Option<String>,
    pattern: String,
    stdout: String,
}

/// Mock connector that records every call and fails on configured patterns
#[derive(Default)]
pub struct RecordingConnector {
    calls: Mutex<Vec<Call>>,
    rules: Mutex<Vec<Rule>>,
    replies: Mutex<Vec<Reply>>,
    delay: Option<Duration>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each exec
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Commands containing `pattern` exit non-zero on every host
    pub fn fail_on(self, pattern: &str) -> Self {
        self.push_rule(None, pattern, None);
        self
    }

    /// Commands containing `pattern` exit non-zero on `host`
    pub fn fail_on_host(self, host: &str, pattern: &str) -> Self {
        self.push_rule(Some(host), pattern, None);
        self
    }

    /// Commands containing `pattern` fail `times` times on `host`, then succeed
    pub fn fail_times(self, host: &str, pattern: &str, times: usize) -> Self {
        self.push_rule(Some(host), pattern, Some(times));
        self
    }

    /// Commands containing `pattern` print `stdout`
    pub fn reply(self, pattern: &str, stdout: &str) -> Self {
        self.push_reply(None, pattern, stdout);
        self
    }

    /// Like [`reply`](Self::reply) but only on `host`, taking precedence there
    pub fn reply_on_host(self, host: &str, pattern: &str, stdout: &str) -> Self {
        self.push_reply(Some(host), pattern, stdout);
        self
    }

    fn push_reply(&self, host: Option<&str>, pattern: &str, stdout: &str) {
        self.replies.lock().push(Reply {
            host: host.map(str::to_string),
            pattern: pattern.to_string(),
            stdout: stdout.to_string(),
        });
    }

    fn push_rule(&self, host: Option<&str>, pattern: &str, remaining: Option<usize>) {
        self.rules.lock().push(Rule {
            host: host.map(str::to_string),
            pattern: pattern.to_string(),
            remaining,
            exit_code: 1,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Exec commands run on `host`, in order
    pub fn commands(&self, host: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Exec { host: h, command, .. } if h == host => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Copies made to `host`, as (local, remote)
    pub fn copies(&self, host: &str) -> Vec<(PathBuf, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Copy { host: h, local, remote } if h == host => Some((local.clone(), remote.clone())),
                _ => None,
            })
            .collect()
    }

    /// Hosts that received any call
    pub fn touched_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.calls.lock().iter().map(|c| c.host().to_string()).collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    fn failure_for(&self, host: &str, command: &str) -> Option<i32> {
        let mut rules = self.rules.lock();
        for rule in rules.iter_mut() {
            let host_matches = rule.host.as_deref().map_or(true, |h| h == host);
            if !host_matches || !command.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return Some(rule.exit_code),
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return Some(rule.exit_code);
                }
            }
        }
        None
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn exec(&self, host: &Host, command: &str, privileged: bool) -> Result<CommandOutput, ConnectorError> {
        self.calls.lock().push(Call::Exec {
            host: host.name.clone(),
            command: command.to_string(),
            privileged,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(exit_code) = self.failure_for(&host.name, command) {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("simulated failure: {}", command),
                exit_code,
            });
        }

        let stdout = self
            .replies
            .lock()
            .iter()
            .filter(|r| r.host.as_deref().map_or(true, |h| h == host.name) && command.contains(&r.pattern))
            .max_by_key(|r| r.host.is_some())
            .map(|r| r.stdout.clone())
            .unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn copy(&self, host: &Host, local: &Path, remote: &str) -> Result<(), ConnectorError> {
        self.calls.lock().push(Call::Copy {
            host: host.name.clone(),
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        Ok(())
    }
}

/// Three-node inventory: one control plane, two workers
pub fn inventory() -> Vec<Host> {
    vec![
        Host::new("node1", "10.0.0.1").with_role(Role::ControlPlane),
        Host::new("node2", "10.0.0.2").with_role(Role::Worker),
        Host::new("node3", "10.0.0.3").with_role(Role::Worker),
    ]
}

pub fn cluster(manager: ContainerManager) -> ClusterConfig {
    let mut config = ClusterConfig::new("test-cluster", inventory());
    config.kubernetes.container_manager = manager;
    config
}

pub fn runtime(config: ClusterConfig, connector: &Arc<RecordingConnector>) -> Runtime {
    Runtime::new(config, connector.clone())
}

/// Collects emitted events for later assertions
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<PipelineEvent>>>);

impl EventLog {
    pub fn handler(&self) -> impl Fn(PipelineEvent) + Send + Sync + 'static {
        let log = self.0.clone();
        move |event| log.lock().push(event)
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.0.lock().clone()
    }
}

/// Assert that `needle` appears in some command run on `host`
pub fn assert_ran(connector: &RecordingConnector, host: &str, needle: &str) {
    let commands = connector.commands(host);
    assert!(
        commands.iter().any(|c| c.contains(needle)),
        "expected `{}` on {}, got {:#?}",
        needle,
        host,
        commands
    );
}

/// Assert that no command on `host` contains `needle`
pub fn assert_not_ran(connector: &RecordingConnector, host: &str, needle: &str) {
    let commands = connector.commands(host);
    assert!(
        !commands.iter().any(|c| c.contains(needle)),
        "did not expect `{}` on {}, got {:#?}",
        needle,
        host,
        commands
    );
}
