//! Runtime - inventory, transport and configuration bound together for a run

use crate::connector::{Connector, Runner};
use crate::core::cache::PipelineCache;
use crate::core::config::ClusterConfig;
use crate::core::host::{Host, HostSelector};
use crate::core::variable::{InventoryVariables, VariableError, VariableResolver};
use serde_json::Value;
use std::sync::Arc;

/// Read-only context shared by every task of a pipeline
#[derive(Clone)]
pub struct Runtime {
    config: Arc<ClusterConfig>,
    local: Host,
    connector: Arc<dyn Connector>,
    variables: Arc<dyn VariableResolver>,
}

impl Runtime {
    pub fn new(config: ClusterConfig, connector: Arc<dyn Connector>) -> Self {
        let variables = InventoryVariables::new(config.variables.clone(), config.hosts.clone());
        Self {
            config: Arc::new(config),
            local: Host::local(),
            connector,
            variables: Arc::new(variables),
        }
    }

    /// Replace the default inventory-backed variable resolver
    pub fn with_variables(mut self, variables: Arc<dyn VariableResolver>) -> Self {
        self.variables = variables;
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Inventory hosts in declaration order
    pub fn hosts(&self) -> &[Host] {
        &self.config.hosts
    }

    pub fn local_host(&self) -> &Host {
        &self.local
    }

    /// Resolve a selector against the inventory
    pub fn select(&self, selector: &HostSelector) -> Vec<Host> {
        match selector {
            HostSelector::Local => vec![self.local.clone()],
            _ => self
                .config
                .hosts
                .iter()
                .filter(|h| selector.matches(h))
                .cloned()
                .collect(),
        }
    }

    /// The view an action receives when running on `host`
    pub fn for_host(&self, host: &Host, cache: Arc<PipelineCache>) -> HostRuntime {
        HostRuntime {
            runner: Runner::new(host.clone(), self.connector.clone()),
            cache,
            config: self.config.clone(),
            variables: self.variables.clone(),
        }
    }
}

/// Everything an action may touch while running on one host
#[derive(Clone)]
pub struct HostRuntime {
    runner: Runner,
    cache: Arc<PipelineCache>,
    config: Arc<ClusterConfig>,
    variables: Arc<dyn VariableResolver>,
}

impl HostRuntime {
    pub fn remote_host(&self) -> &Host {
        self.runner.host()
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    pub fn cluster(&self) -> &ClusterConfig {
        &self.config
    }

    /// All variables visible to this host
    pub fn host_vars(&self) -> Result<Value, VariableError> {
        self.variables.get(self.runner.host())
    }
}
