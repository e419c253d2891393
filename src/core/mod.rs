//! Core domain models
//!
//! Hosts, cluster configuration, the pipeline cache, variables and the
//! runtime that binds them to a connector.

pub mod cache;
pub mod config;
pub mod host;
pub mod runtime;
pub mod state;
pub mod variable;

pub use cache::{binaries_key, BinaryMap, CacheError, CacheValue, KubeBinary, PipelineCache};
pub use config::{ClusterConfig, ContainerManager};
pub use host::{Arch, Host, HostSelector, Role, LOCAL_HOST};
pub use runtime::{HostRuntime, Runtime};
pub use state::{ExecutionStatus, PipelineState};
pub use variable::{InventoryVariables, VariableError, VariableResolver};
