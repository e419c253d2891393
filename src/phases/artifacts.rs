//! Artifact registration on the orchestrating machine

use crate::action::RegisterBinaries;
use crate::core::host::HostSelector;
use crate::execution::{Module, Task};

/// Store binary descriptors for every inventory architecture
pub fn register_module() -> Module {
    Module::new("RegisterArtifacts")
        .task(Task::new("register binaries", RegisterBinaries::new()).on(HostSelector::Local))
}
