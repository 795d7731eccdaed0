//! Cluster descriptor validation and mapping onto installer inputs.

use crate::error::ControllerError;
use crds::{CustomClusterSpec, Machine};
use kubespray::{ClusterConfig, Host, Inventory, KubeVersion};
use std::collections::HashSet;

/// Checks the descriptor before any job is started.
///
/// Returns a message suitable for the `Ready` condition on failure.
pub fn validate(spec: &CustomClusterSpec) -> Result<(), ControllerError> {
    if spec.masters.is_empty() {
        return Err(ControllerError::InvalidDescriptor(
            "at least one master is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for machine in spec.masters.iter().chain(spec.workers.iter()) {
        // Host names must be DNS subdomains so the recorded inventory reads back
        host(machine)
            .validate()
            .map_err(|e| ControllerError::InvalidDescriptor(e.to_string()))?;
        if !names.insert(machine.hostname.as_str()) {
            return Err(ControllerError::InvalidDescriptor(format!(
                "hostname '{}' is declared more than once",
                machine.hostname
            )));
        }
    }

    KubeVersion::parse(&spec.kube_version).map_err(|e| {
        ControllerError::InvalidDescriptor(format!("kubeVersion '{}': {}", spec.kube_version, e))
    })?;

    Ok(())
}

fn host(machine: &Machine) -> Host {
    Host::new(&machine.hostname, &machine.public_address, &machine.private_address)
}

pub fn hosts(machines: &[Machine]) -> Vec<Host> {
    machines.iter().map(host).collect()
}

/// Full inventory rendered from the declared machines.
pub fn render_inventory(spec: &CustomClusterSpec) -> Result<String, ControllerError> {
    Ok(Inventory::new(&hosts(&spec.masters), &hosts(&spec.workers))?.render())
}

/// Installer parameters from the descriptor, pinned to `version`.
pub fn cluster_config(spec: &CustomClusterSpec, version: KubeVersion) -> ClusterConfig {
    let mut config = ClusterConfig::new(spec.cni.as_str(), version);
    config.pods_subnet = spec.network.pod_cidr.clone();
    config.service_addresses = spec.network.service_cidr.clone();
    config.apiserver_ip = spec.control_plane.address.clone();
    config.apiserver_port = spec.control_plane.port;
    config.cert_sans = spec.control_plane.cert_sans.clone();
    config.loadbalancer_domain = spec.control_plane.load_balancer_domain.clone();
    config.cluster_name = spec.cluster_name.clone();
    config.image_repo = spec.image_repository.clone();
    config.feature_gates = spec.feature_gates.clone();
    config
}

/// The declared version, parsed. Callers run `validate` first.
pub fn declared_version(spec: &CustomClusterSpec) -> Result<KubeVersion, ControllerError> {
    Ok(KubeVersion::parse(&spec.kube_version)?)
}
