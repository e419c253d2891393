//! Scenario-based tests for kubefleet

mod certificates;
mod fan_out;
mod modules;
mod registry_login;
mod templating;
mod upgrade_nodes;
