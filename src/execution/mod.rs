//! Pipeline execution engine
//!
//! A [`Pipeline`] runs its [`Module`]s in order, each module runs its
//! [`Task`]s in order, and each task fans its action out over the selected
//! hosts.

pub mod condition;
pub mod events;
pub mod module;
pub mod pipeline;
pub mod task;

pub use condition::{CacheFlag, Condition, ContainerManagerIs, KubeVersionAtLeast, NeedsUpgrade};
pub use events::{EventHandler, EventSink, PipelineEvent};
pub use module::{Module, ModuleReport, SkipPredicate};
pub use pipeline::{Pipeline, PipelineError, PipelineReport};
pub use task::{FailurePolicy, HostFailure, HostResult, HostStatus, Task, TaskError, TaskReport};
