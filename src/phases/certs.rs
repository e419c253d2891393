//! Cluster PKI generated on the orchestrating machine

use crate::action::GenCert;
use crate::core::config::ClusterConfig;
use crate::core::host::{HostSelector, Role};
use crate::execution::{Module, Task};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// Subject names for the server certificate: control-plane names and addresses
pub fn control_plane_sans(config: &ClusterConfig) -> Vec<String> {
    let mut sans = BTreeSet::new();
    for host in config.hosts_with_role(Role::ControlPlane) {
        sans.insert(host.name.clone());
        sans.insert(host.address.clone());
        sans.insert(host.internal_address().to_string());
    }
    sans.into_iter().collect()
}

fn pki_path(dir: &Path, file: &str) -> String {
    dir.join(file).to_string_lossy().into_owned()
}

/// Root CA, then a server certificate signed by it, under `<work_dir>/pki`
pub fn module(config: &ClusterConfig) -> Module {
    let pki = config.artifacts.work_dir.join("pki");
    let root_key = pki_path(&pki, "root.key");
    let root_cert = pki_path(&pki, "root.crt");

    let root_args = json!({
        "cn": "{{ ca_common_name | default('kubefleet') }}",
        "policy": "IfNotPresent",
        "out_key": root_key,
        "out_cert": root_cert,
    });
    let server_args = json!({
        "root_key": root_key,
        "root_cert": root_cert,
        "cn": "{{ server_common_name | default('kube-apiserver') }}",
        "policy": "IfNotPresent",
        "date": "8760h",
        "is_ca": false,
        "sans": control_plane_sans(config).into_iter().map(Value::String).collect::<Vec<_>>(),
        "out_key": pki_path(&pki, "server.key"),
        "out_cert": pki_path(&pki, "server.crt"),
    });

    Module::new("GenerateCerts")
        .task(Task::new("generate root ca", GenCert::new(root_args)).on(HostSelector::Local))
        .task(Task::new("generate server cert", GenCert::new(server_args)).on(HostSelector::Local))
}
