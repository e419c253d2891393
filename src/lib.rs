//! kubefleet - a cluster lifecycle orchestrator
//!
//! Pipelines of modules, tasks and actions driven over SSH against a host
//! inventory, with facts shared through a pipeline-scoped cache.

pub mod action;
pub mod cli;
pub mod connector;
pub mod core;
pub mod execution;
pub mod phases;

// Re-export commonly used types
pub use crate::action::{Action, ActionError};
pub use crate::connector::{CommandOutput, Connector, ConnectorError, Runner, SshConnector};
pub use crate::core::{ClusterConfig, ExecutionStatus, Host, HostSelector, PipelineCache, Runtime};
pub use crate::execution::{FailurePolicy, Module, Pipeline, PipelineError, PipelineEvent, Task, TaskError};
pub use crate::phases::PipelineKind;
