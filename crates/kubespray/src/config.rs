//! Cluster config codec
//!
//! Renders the installer's `k8s-cluster.yml` group variables as one
//! `key: value` line per setting. Only the Kubernetes version is ever read
//! back, from the line starting with [`KUBE_VERSION_MARKER`].

use crate::error::KubesprayError;
use crate::version::KubeVersion;
use std::fmt::Write;

/// Prefix of the line recording the installed Kubernetes version
pub const KUBE_VERSION_MARKER: &str = "kube_version: ";
pub const KUBE_VERSION_KEY: &str = "kube_version";

pub const NETWORK_PLUGIN_KEY: &str = "kube_network_plugin";
pub const PODS_SUBNET_KEY: &str = "kube_pods_subnet";
pub const SERVICE_ADDRESSES_KEY: &str = "kube_service_addresses";
pub const APISERVER_IP_KEY: &str = "kube_apiserver_ip";
pub const APISERVER_PORT_KEY: &str = "kube_apiserver_port";
pub const CERT_SANS_KEY: &str = "supplementary_addresses_in_ssl_keys";
pub const CLUSTER_NAME_KEY: &str = "cluster_name";
pub const IMAGE_REPO_KEY: &str = "kube_image_repo";
pub const FEATURE_GATES_KEY: &str = "kube_feature_gates";
pub const LOADBALANCER_DOMAIN_KEY: &str = "apiserver_loadbalancer_domain_name";

/// Cluster parameters handed to the installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub network_plugin: String,
    pub pods_subnet: Option<String>,
    pub service_addresses: Option<String>,
    pub apiserver_ip: Option<String>,
    pub apiserver_port: Option<u16>,
    pub cert_sans: Vec<String>,
    pub kube_version: KubeVersion,
    pub cluster_name: Option<String>,
    pub image_repo: Option<String>,
    pub feature_gates: Vec<String>,
    pub loadbalancer_domain: Option<String>,
}

impl ClusterConfig {
    /// Minimal config: network plugin and version, everything else defaulted
    /// by the installer
    pub fn new(network_plugin: impl Into<String>, kube_version: KubeVersion) -> Self {
        Self {
            network_plugin: network_plugin.into(),
            pods_subnet: None,
            service_addresses: None,
            apiserver_ip: None,
            apiserver_port: None,
            cert_sans: Vec::new(),
            kube_version,
            cluster_name: None,
            image_repo: None,
            feature_gates: Vec::new(),
            loadbalancer_domain: None,
        }
    }

    /// Render the key/value text. Unset optional keys are omitted.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}: {}", NETWORK_PLUGIN_KEY, self.network_plugin);
        let optional = [
            (PODS_SUBNET_KEY, self.pods_subnet.clone()),
            (SERVICE_ADDRESSES_KEY, self.service_addresses.clone()),
            (APISERVER_IP_KEY, self.apiserver_ip.clone()),
            (APISERVER_PORT_KEY, self.apiserver_port.map(|p| p.to_string())),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                let _ = writeln!(out, "{}: {}", key, value);
            }
        }
        if !self.cert_sans.is_empty() {
            let _ = writeln!(out, "{}: {}", CERT_SANS_KEY, flow_list(&self.cert_sans));
        }
        let _ = writeln!(out, "{}{}", KUBE_VERSION_MARKER, self.kube_version);
        let optional = [
            (CLUSTER_NAME_KEY, &self.cluster_name),
            (IMAGE_REPO_KEY, &self.image_repo),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                let _ = writeln!(out, "{}: {}", key, value);
            }
        }
        if !self.feature_gates.is_empty() {
            let _ = writeln!(out, "{}: {}", FEATURE_GATES_KEY, flow_list(&self.feature_gates));
        }
        if let Some(domain) = &self.loadbalancer_domain {
            let _ = writeln!(out, "{}: {}", LOADBALANCER_DOMAIN_KEY, domain);
        }
        out
    }
}

fn flow_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("\"{}\"", item)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Recover the recorded Kubernetes version from config text
pub fn parse_version(text: &str) -> Result<KubeVersion, KubesprayError> {
    text.lines()
        .find_map(|line| line.trim_start().strip_prefix(KUBE_VERSION_MARKER))
        .ok_or_else(|| KubesprayError::MissingKey(KUBE_VERSION_KEY.to_string()))
        .and_then(|value| KubeVersion::parse(value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(raw: &str) -> KubeVersion {
        KubeVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_render_minimal() {
        let config = ClusterConfig::new("calico", version("v1.18.0"));
        assert_eq!(config.render(), "kube_network_plugin: calico\nkube_version: v1.18.0\n");
    }

    #[test]
    fn test_render_full() {
        let config = ClusterConfig {
            pods_subnet: Some("10.233.64.0/18".to_string()),
            service_addresses: Some("10.233.0.0/18".to_string()),
            apiserver_ip: Some("10.0.0.10".to_string()),
            apiserver_port: Some(6443),
            cert_sans: vec!["k8s.example.com".to_string(), "1.1.1.1".to_string()],
            cluster_name: Some("cluster.local".to_string()),
            image_repo: Some("registry.example.com".to_string()),
            feature_gates: vec!["TTLAfterFinished=true".to_string()],
            loadbalancer_domain: Some("lb.example.com".to_string()),
            ..ClusterConfig::new("flannel", version("1.19.2"))
        };

        let expected = "\
kube_network_plugin: flannel
kube_pods_subnet: 10.233.64.0/18
kube_service_addresses: 10.233.0.0/18
kube_apiserver_ip: 10.0.0.10
kube_apiserver_port: 6443
supplementary_addresses_in_ssl_keys: [\"k8s.example.com\", \"1.1.1.1\"]
kube_version: v1.19.2
cluster_name: cluster.local
kube_image_repo: registry.example.com
kube_feature_gates: [\"TTLAfterFinished=true\"]
apiserver_loadbalancer_domain_name: lb.example.com
";
        assert_eq!(config.render(), expected);
    }

    #[test]
    fn test_version_round_trip() {
        for raw in ["v1.18.0", "1.19.3", "v1.20.0-rc.1"] {
            let config = ClusterConfig::new("calico", version(raw));
            assert_eq!(parse_version(&config.render()).unwrap(), version(raw));
        }
    }

    #[test]
    fn test_parse_version_missing() {
        assert_eq!(
            parse_version("kube_network_plugin: calico\n"),
            Err(KubesprayError::MissingKey("kube_version".to_string()))
        );
    }

    #[test]
    fn test_parse_version_invalid() {
        assert!(matches!(
            parse_version("kube_version: latest\n"),
            Err(KubesprayError::InvalidVersion { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        prop_compose! {
            fn kube_version()(
                prefix in prop::option::of(Just("v")),
                major in 0u64..4,
                minor in 0u64..40,
                patch in 0u64..20,
            ) -> String {
                format!("{}{}.{}.{}", prefix.unwrap_or_default(), major, minor, patch)
            }
        }

        proptest! {
            #[test]
            fn rendered_version_is_recovered(
                raw in kube_version(),
                plugin in "calico|flannel|cilium",
                subnet in prop::option::of("10\\.[0-9]{1,3}\\.0\\.0/1[6-8]"),
                sans in prop::collection::vec("[a-z]{1,8}\\.example\\.com", 0..3),
            ) {
                let version = KubeVersion::parse(&raw).unwrap();
                let config = ClusterConfig {
                    pods_subnet: subnet,
                    cert_sans: sans,
                    ..ClusterConfig::new(plugin, version.clone())
                };
                prop_assert_eq!(parse_version(&config.render()).unwrap(), version);
            }
        }
    }
}
