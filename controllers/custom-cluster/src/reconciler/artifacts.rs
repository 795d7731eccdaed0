//! Inventory/config artifacts and the credential secret.
//!
//! Committed artifacts are the durable record of what the installer last
//! applied. A job that needs a candidate artifact gets a staging copy; the
//! staging copy replaces the committed one only after the job succeeds.

use super::state_machine::LifecycleAction;
use crate::error::ControllerError;
use crate::store::ClusterStore;
use crds::CustomCluster;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kubespray::{parse_version, Host, Inventory, KubeVersion};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// ConfigMap key holding the inventory text
pub const INVENTORY_KEY: &str = "hosts.ini";
/// ConfigMap key holding the config text
pub const CONFIG_KEY: &str = "k8s-cluster.yml";
/// Secret key holding the retrieved kubeconfig
pub const KUBECONFIG_KEY: &str = "config";

/// Label linking an owned object to its cluster
pub const CLUSTER_LABEL: &str = "kubeoperator.io/cluster";
/// Label naming a job's action
pub const ACTION_LABEL: &str = "kubeoperator.io/action";
/// Label naming the kind of a stored artifact
pub const ARTIFACT_LABEL: &str = "kubeoperator.io/artifact";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "custom-cluster-controller";

/// The two artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Inventory,
    Config,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Inventory, ArtifactKind::Config];

    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Inventory => "inventory",
            ArtifactKind::Config => "config",
        }
    }

    pub fn data_key(&self) -> &'static str {
        match self {
            ArtifactKind::Inventory => INVENTORY_KEY,
            ArtifactKind::Config => CONFIG_KEY,
        }
    }

    /// Name of the committed ConfigMap
    pub fn committed_name(&self, cluster: &str) -> String {
        format!("{}-{}", cluster, self.suffix())
    }

    /// Name of the staging ConfigMap for one action
    pub fn staged_name(&self, cluster: &str, action: LifecycleAction) -> String {
        format!("{}-{}-{}", cluster, action.as_str(), self.suffix())
    }
}

pub fn kubeconfig_secret_name(cluster: &str) -> String {
    format!("{}-kubeconfig", cluster)
}

/// ConfigMap names a job mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRefs {
    pub inventory: String,
    pub config: String,
}

/// What the committed artifacts say was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedState {
    pub inventory: Inventory,
    pub version: KubeVersion,
}

impl ProvisionedState {
    pub fn workers(&self) -> Vec<Host> {
        self.inventory.workers()
    }
}

/// Labels shared by everything the controller creates for a cluster, plus
/// one `(key, value)` saying what the object is.
pub fn owned_labels(cluster: &str, role: (&str, &str)) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_LABEL.to_string(), cluster.to_string()),
        (role.0.to_string(), role.1.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
    ])
}

/// Metadata for an object owned by `cluster`.
pub fn owned_metadata(cluster: &CustomCluster, name: String, role: (&str, &str)) -> ObjectMeta {
    let cluster_name = cluster.metadata.name.clone().unwrap_or_default();
    ObjectMeta {
        name: Some(name),
        namespace: cluster.metadata.namespace.clone(),
        labels: Some(owned_labels(&cluster_name, role)),
        owner_references: cluster.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

fn artifact_config_map(cluster: &CustomCluster, name: String, kind: ArtifactKind, text: String) -> ConfigMap {
    ConfigMap {
        metadata: owned_metadata(cluster, name, (ARTIFACT_LABEL, kind.suffix())),
        data: Some(BTreeMap::from([(kind.data_key().to_string(), text)])),
        ..Default::default()
    }
}

fn config_map_text(config_map: &ConfigMap, kind: ArtifactKind) -> Option<String> {
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(kind.data_key()).cloned())
}

/// Typed access to one cluster's artifacts.
pub struct Artifacts<'a> {
    store: &'a dyn ClusterStore,
    cluster: &'a CustomCluster,
    namespace: &'a str,
    name: &'a str,
}

impl std::fmt::Debug for Artifacts<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Artifacts({}/{})", self.namespace, self.name)
    }
}

impl<'a> Artifacts<'a> {
    pub fn new(store: &'a dyn ClusterStore, cluster: &'a CustomCluster, namespace: &'a str, name: &'a str) -> Self {
        Self {
            store,
            cluster,
            namespace,
            name,
        }
    }

    pub fn committed_refs(&self) -> ArtifactRefs {
        ArtifactRefs {
            inventory: ArtifactKind::Inventory.committed_name(self.name),
            config: ArtifactKind::Config.committed_name(self.name),
        }
    }

    async fn read(&self, config_map_name: &str, kind: ArtifactKind) -> Result<Option<String>, ControllerError> {
        let config_map = self.store.get_config_map(self.namespace, config_map_name).await?;
        Ok(config_map.as_ref().and_then(|cm| config_map_text(cm, kind)))
    }

    /// Committed text for one artifact kind.
    pub async fn committed(&self, kind: ArtifactKind) -> Result<Option<String>, ControllerError> {
        self.read(&kind.committed_name(self.name), kind).await
    }

    /// Whether a committed inventory exists at all.
    pub async fn has_committed_inventory(&self) -> Result<bool, ControllerError> {
        Ok(self
            .store
            .get_config_map(self.namespace, &ArtifactKind::Inventory.committed_name(self.name))
            .await?
            .is_some())
    }

    /// Recovers the provisioned state from the committed artifacts.
    ///
    /// Before the first successful init (`established == false`) anything
    /// missing or unparsable means "not provisioned". Afterwards it means the
    /// record drifted, which is a hard error.
    pub async fn load_provisioned(&self, established: bool) -> Result<Option<ProvisionedState>, ControllerError> {
        let inventory_text = self.committed(ArtifactKind::Inventory).await?;
        let config_text = self.committed(ArtifactKind::Config).await?;

        let (inventory_text, config_text) = match (inventory_text, config_text) {
            (Some(inventory), Some(config)) => (inventory, config),
            _ if !established => return Ok(None),
            (None, _) => {
                return Err(ControllerError::MissingArtifact(
                    ArtifactKind::Inventory.committed_name(self.name),
                ));
            }
            (Some(_), None) => {
                return Err(ControllerError::MissingArtifact(
                    ArtifactKind::Config.committed_name(self.name),
                ));
            }
        };

        let parsed = Inventory::parse(&inventory_text)
            .and_then(|inventory| parse_version(&config_text).map(|version| (inventory, version)));
        match parsed {
            Ok((inventory, version)) => Ok(Some(ProvisionedState { inventory, version })),
            Err(e) if !established => {
                warn!(
                    "Ignoring unparsable artifacts for {}/{} before first provisioning: {}",
                    self.namespace, self.name, e
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a staging artifact for `action` and returns its name.
    pub async fn stage(&self, action: LifecycleAction, kind: ArtifactKind, text: String) -> Result<String, ControllerError> {
        let staged = kind.staged_name(self.name, action);
        self.store
            .apply_config_map(self.namespace, artifact_config_map(self.cluster, staged.clone(), kind, text))
            .await?;
        debug!("Staged {} for {}/{}", staged, self.namespace, self.name);
        Ok(staged)
    }

    /// Writes a committed artifact directly.
    pub async fn commit_text(&self, kind: ArtifactKind, text: String) -> Result<(), ControllerError> {
        let name = kind.committed_name(self.name);
        self.store
            .apply_config_map(self.namespace, artifact_config_map(self.cluster, name, kind, text))
            .await
    }

    /// Promotes the staging artifact of `action` to committed and removes it.
    ///
    /// Returns `false` when nothing is staged, which happens when an earlier
    /// pass committed but failed before the job was released.
    pub async fn commit_staged(&self, action: LifecycleAction, kind: ArtifactKind) -> Result<bool, ControllerError> {
        let staged = kind.staged_name(self.name, action);
        let Some(text) = self.read(&staged, kind).await? else {
            return Ok(false);
        };
        self.commit_text(kind, text).await?;
        self.store.delete_config_map(self.namespace, &staged).await?;
        info!(
            "Committed {} for {}/{}",
            kind.committed_name(self.name),
            self.namespace,
            self.name
        );
        Ok(true)
    }

    /// Removes committed and staging artifacts of every kind.
    pub async fn delete_all(&self) -> Result<(), ControllerError> {
        for kind in ArtifactKind::ALL {
            self.store
                .delete_config_map(self.namespace, &kind.committed_name(self.name))
                .await?;
            for action in LifecycleAction::ALL {
                self.store
                    .delete_config_map(self.namespace, &kind.staged_name(self.name, action))
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStore;
    use crate::test_utils::{create_test_cluster, create_test_spec, seed_committed_artifacts};

    #[test]
    fn test_artifact_names() {
        assert_eq!(ArtifactKind::Inventory.committed_name("demo"), "demo-inventory");
        assert_eq!(ArtifactKind::Config.committed_name("demo"), "demo-config");
        assert_eq!(
            ArtifactKind::Inventory.staged_name("demo", LifecycleAction::ScaleUp),
            "demo-scale-up-inventory"
        );
        assert_eq!(kubeconfig_secret_name("demo"), "demo-kubeconfig");
    }

    #[tokio::test]
    async fn test_load_provisioned_absent_before_first_success() {
        let store = MockStore::new();
        let cluster = create_test_cluster("demo", "default", create_test_spec(&["node1"], "v1.18.0"), None);
        let artifacts = Artifacts::new(&store, &cluster, "default", "demo");

        assert_eq!(artifacts.load_provisioned(false).await.unwrap(), None);
        assert!(matches!(
            artifacts.load_provisioned(true).await,
            Err(ControllerError::MissingArtifact(_))
        ));
    }

    #[tokio::test]
    async fn test_load_provisioned_reads_workers_and_version() {
        let store = MockStore::new();
        let spec = create_test_spec(&["node1", "node2"], "v1.18.0");
        let cluster = create_test_cluster("demo", "default", spec.clone(), None);
        seed_committed_artifacts(&store, &cluster, &spec);

        let artifacts = Artifacts::new(&store, &cluster, "default", "demo");
        let state = artifacts.load_provisioned(true).await.unwrap().unwrap();
        let names: Vec<String> = state.workers().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["node1", "node2"]);
        assert_eq!(state.version.to_string(), "v1.18.0");
    }

    #[tokio::test]
    async fn test_unparsable_artifacts_are_hard_errors_once_established() {
        let store = MockStore::new();
        let cluster = create_test_cluster("demo", "default", create_test_spec(&[], "v1.18.0"), None);
        let artifacts = Artifacts::new(&store, &cluster, "default", "demo");
        artifacts
            .commit_text(ArtifactKind::Inventory, "node1 ansible_host=1.1.1.1\n".to_string())
            .await
            .unwrap();
        artifacts
            .commit_text(ArtifactKind::Config, "kube_network_plugin: calico\n".to_string())
            .await
            .unwrap();

        assert_eq!(artifacts.load_provisioned(false).await.unwrap(), None);
        assert!(matches!(
            artifacts.load_provisioned(true).await,
            Err(ControllerError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_staged_promotes_and_removes_staging() {
        let store = MockStore::new();
        let cluster = create_test_cluster("demo", "default", create_test_spec(&[], "v1.18.0"), None);
        let artifacts = Artifacts::new(&store, &cluster, "default", "demo");

        let staged = artifacts
            .stage(LifecycleAction::Upgrade, ArtifactKind::Config, "kube_version: v1.19.0\n".to_string())
            .await
            .unwrap();
        assert_eq!(staged, "demo-upgrade-config");

        assert!(artifacts
            .commit_staged(LifecycleAction::Upgrade, ArtifactKind::Config)
            .await
            .unwrap());
        assert!(!store.has_config_map("default", "demo-upgrade-config"));
        assert_eq!(
            store.config_map_data("default", "demo-config", CONFIG_KEY).as_deref(),
            Some("kube_version: v1.19.0\n")
        );

        // Second commit finds nothing staged and leaves the committed copy alone
        assert!(!artifacts
            .commit_staged(LifecycleAction::Upgrade, ArtifactKind::Config)
            .await
            .unwrap());
        assert!(store.has_config_map("default", "demo-config"));
    }
}
