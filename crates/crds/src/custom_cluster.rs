//! CustomCluster CRD
//!
//! Declares the desired topology, CNI and Kubernetes version of a cluster
//! installed onto a fixed pool of pre-provisioned machines.

use crate::conditions::ClusterCondition;
use crate::machine::Machine;
use crate::references::{SecretKeyReference, SecretReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubeoperator.io",
    version = "v1alpha1",
    kind = "CustomCluster",
    namespaced,
    status = "CustomClusterStatus",
    shortname = "cc",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.provisionedVersion"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CustomClusterSpec {
    /// Control-plane machines, in declared order. The first one is used for
    /// credential retrieval.
    pub masters: Vec<Machine>,

    /// Worker machines, in declared order
    #[serde(default)]
    pub workers: Vec<Machine>,

    /// Container network plugin
    #[serde(default)]
    pub cni: CniType,

    /// Kubernetes version, with or without a leading `v` (e.g. "v1.18.0")
    pub kube_version: String,

    /// Control-plane endpoint and certificate configuration
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    /// Pod and service networks
    #[serde(default)]
    pub network: NetworkConfig,

    /// Cluster DNS domain name passed to the installer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Registry prefix for Kubernetes component images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_repository: Option<String>,

    /// Feature gates, as `Name=true|false` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_gates: Vec<String>,

    /// Secret holding the SSH private key used to reach the machines
    pub ssh_key_secret_ref: SecretKeyReference,

    /// SSH login user
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Expected SHA-256 fingerprint of the first master's SSH host key, as
    /// printed by `ssh-keygen -lf` (`SHA256:...`). Unset accepts any key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host_key_fingerprint: Option<String>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Supported container network plugins
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CniType {
    #[default]
    Calico,
    Flannel,
    Cilium,
    Weave,
    KubeRouter,
}

impl CniType {
    /// Name of the plugin as the installer spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            CniType::Calico => "calico",
            CniType::Flannel => "flannel",
            CniType::Cilium => "cilium",
            CniType::Weave => "weave",
            CniType::KubeRouter => "kube-router",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Advertised API server address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// API server port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Domain name of an external load balancer in front of the API servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_domain: Option<String>,

    /// Extra subject alternative names for the API server certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cert_sans: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Pod network CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,

    /// Service network CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,
}

/// Lifecycle phase of a CustomCluster
///
/// `ScalingUp`, `ScalingDown` and `Upgrading` are only entered from
/// `Provisioned` and always leave back to it (or to `Unknown` for a failed
/// upgrade).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    #[default]
    Pending,
    Provisioning,
    Provisioned,
    ScalingUp,
    ScalingDown,
    Upgrading,
    Deleting,
    ProvisionFailed,
    Unknown,
}

impl LifecyclePhase {
    /// Phases in which a management job is in flight
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::Provisioning
                | LifecyclePhase::ScalingUp
                | LifecyclePhase::ScalingDown
                | LifecyclePhase::Upgrading
                | LifecyclePhase::Deleting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Pending => "Pending",
            LifecyclePhase::Provisioning => "Provisioning",
            LifecyclePhase::Provisioned => "Provisioned",
            LifecyclePhase::ScalingUp => "ScalingUp",
            LifecyclePhase::ScalingDown => "ScalingDown",
            LifecyclePhase::Upgrading => "Upgrading",
            LifecyclePhase::Deleting => "Deleting",
            LifecyclePhase::ProvisionFailed => "ProvisionFailed",
            LifecyclePhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomClusterStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: LifecyclePhase,

    /// Latest observation per lifecycle action
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,

    /// Secret holding the retrieved admin kubeconfig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_secret_ref: Option<SecretReference>,

    /// Kubernetes version recorded by the last successful action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_version: Option<String>,

    /// Generation of the spec last acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl CustomCluster {
    /// Current phase, `Pending` when no status was written yet
    pub fn phase(&self) -> LifecyclePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}
