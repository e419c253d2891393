//! Print a variable or message for a host

use crate::action::{Action, ActionError};
use crate::core::runtime::HostRuntime;
use crate::core::variable::{parse_string, string_var};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Render `var` (a variable path) or `msg` (a template) for the host
///
/// `var` takes precedence when both are present.
#[derive(Debug, Clone)]
pub struct Inspect {
    args: Value,
}

impl Inspect {
    pub fn new(args: Value) -> Self {
        Self { args }
    }

    /// Render against already-resolved host variables
    pub fn render(&self, vars: &Value) -> Result<String, ActionError> {
        if let Ok(var) = string_var(vars, &self.args, "var") {
            return Ok(parse_string(vars, &format!("{{{{ {} }}}}", var))?);
        }
        if let Ok(msg) = string_var(vars, &self.args, "msg") {
            return Ok(msg);
        }
        Err(ActionError::InvalidArgument(
            "unknown args for debug. only support var or msg".to_string(),
        ))
    }
}

#[async_trait]
impl Action for Inspect {
    fn name(&self) -> &str {
        "debug"
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let vars = runtime.host_vars()?;
        let output = self.render(&vars)?;
        info!("[{}] {}", runtime.remote_host().name, output);
        Ok(output)
    }
}
