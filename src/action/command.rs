//! Templated shell command

use crate::action::{Action, ActionError, StepContext};
use crate::core::runtime::HostRuntime;
use crate::core::variable::parse_string;
use async_trait::async_trait;

/// Run a command rendered against the host's variables
#[derive(Debug, Clone)]
pub struct ShellCommand {
    name: String,
    template: String,
    privileged: bool,
    ignore_errors: bool,
}

impl ShellCommand {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            privileged: true,
            ignore_errors: false,
        }
    }

    /// Run without sudo
    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }

    /// Treat a non-zero exit as success
    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }
}

#[async_trait]
impl Action for ShellCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let vars = runtime.host_vars()?;
        let command = parse_string(&vars, &self.template)?;
        let runner = runtime.runner();

        let result = if self.privileged {
            runner.sudo_cmd(&command, self.ignore_errors).await
        } else {
            runner.cmd(&command, self.ignore_errors).await
        };
        result.step(format!("{} failed", self.name))
    }
}
