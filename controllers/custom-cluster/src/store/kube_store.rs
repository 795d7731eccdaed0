//! `ClusterStore` backed by the Kubernetes API server.

use super::ClusterStore;
use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{CustomCluster, CustomClusterStatus};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

/// Field manager used for server-side apply of artifacts.
const FIELD_MANAGER: &str = "custom-cluster-controller";

/// Store implementation using a shared kube client.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn clusters(&self, namespace: &str) -> Api<CustomCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// A create that lost to an existing object reports `Conflict`, so callers
/// can adopt the object that won.
fn create_error(err: kube::Error) -> ControllerError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => ControllerError::Conflict(ae.message),
        e => ControllerError::Kube(e),
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ControllerError> {
        Ok(self.config_maps(namespace).get_opt(name).await?)
    }

    async fn apply_config_map(&self, namespace: &str, config_map: ConfigMap) -> Result<(), ControllerError> {
        let name = config_map.metadata.name.clone().ok_or_else(|| {
            ControllerError::InvalidConfig("ConfigMap is missing a name".to_string())
        })?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.config_maps(namespace)
            .patch(&name, &params, &Patch::Apply(&config_map))
            .await?;
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let api = self.config_maps(namespace);
        if api.get_opt(name).await?.is_some() {
            api.delete(name, &DeleteParams::default()).await?;
            debug!("Deleted ConfigMap {}/{}", namespace, name);
        }
        Ok(())
    }

    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> Result<Vec<Job>, ControllerError> {
        let jobs = self
            .jobs(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(jobs.items)
    }

    async fn create_job(&self, namespace: &str, job: Job) -> Result<Job, ControllerError> {
        self.jobs(namespace)
            .create(&PostParams::default(), &job)
            .await
            .map_err(create_error)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let api = self.jobs(namespace);
        if api.get_opt(name).await?.is_some() {
            // Background propagation so the job's pods go with it
            api.delete(name, &DeleteParams::background()).await?;
            debug!("Deleted Job {}/{}", namespace, name);
        }
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ControllerError> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }

    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<(), ControllerError> {
        self.secrets(namespace)
            .create(&PostParams::default(), &secret)
            .await
            .map_err(create_error)?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let api = self.secrets(namespace);
        if api.get_opt(name).await?.is_some() {
            api.delete(name, &DeleteParams::default()).await?;
            debug!("Deleted Secret {}/{}", namespace, name);
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CustomClusterStatus,
    ) -> Result<(), ControllerError> {
        let patch = json!({ "status": status });
        self.clusters(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), ControllerError> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.clusters(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
