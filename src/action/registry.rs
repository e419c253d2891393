//! Log hosts into private image registries

use crate::action::{Action, ActionError, StepContext};
use crate::core::config::RegistryAuth;
use crate::core::runtime::HostRuntime;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Backslash-escape `$`, `&` and `*` for the privileged shell wrapper
pub fn escape_special_characters(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '$' | '&' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The `docker login` invocation for one registry
pub fn login_command(registry: &str, auth: &RegistryAuth) -> String {
    format!(
        "HOME=$HOME docker login --username '{}' --password '{}' {}",
        escape_special_characters(&auth.username),
        escape_special_characters(&auth.password),
        registry
    )
}

/// `docker login` against every configured registry
///
/// Entries with an empty user or password are skipped. The resulting
/// client config is copied to `/.docker/config.json` so the kubelet can
/// pull with it.
#[derive(Debug, Clone, Default)]
pub struct RegistryLogin {
    auths: Option<BTreeMap<String, RegistryAuth>>,
}

impl RegistryLogin {
    /// Use the credentials from the cluster configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit credentials instead of the cluster configuration
    pub fn with_auths(auths: BTreeMap<String, RegistryAuth>) -> Self {
        Self { auths: Some(auths) }
    }
}

#[async_trait]
impl Action for RegistryLogin {
    fn name(&self) -> &str {
        "registry-login"
    }

    async fn execute(&self, runtime: &HostRuntime) -> Result<String, ActionError> {
        let runner = runtime.runner();
        let host = &runtime.remote_host().name;
        let auths = self
            .auths
            .as_ref()
            .unwrap_or(&runtime.cluster().registry.auths);

        let mut logged_in = 0;
        for (registry, auth) in auths {
            if auth.username.is_empty() || auth.password.is_empty() {
                debug!("[{}] skipping {}: incomplete credentials", host, registry);
                continue;
            }
            runner
                .sudo_cmd(&login_command(registry, auth), false)
                .await
                .step(format!("login registry failed, cmd: docker login {}", registry))?;
            logged_in += 1;
        }

        let exists = runner
            .sudo_cmd("if [ -e $HOME/.docker/config.json ]; then echo 'exist'; fi", false)
            .await
            .unwrap_or_default();
        if exists.contains("exist") {
            runner
                .sudo_cmd(
                    "mkdir -p /.docker && cp -f $HOME/.docker/config.json /.docker/ && chmod 0644 /.docker/config.json ",
                    false,
                )
                .await
                .step("copy docker auths failed")?;
        }

        info!("[{}] logged into {} registries", host, logged_in);
        Ok(String::new())
    }
}
