//! Declarative store access for the reconciler.
//!
//! `ClusterStore` is the narrow seam between the lifecycle logic and the
//! Kubernetes API: ConfigMaps hold the inventory/config artifacts, Jobs run
//! the installer, Secrets hold credentials, and the CustomCluster object
//! carries status and finalizers. `KubeStore` talks to the API server;
//! `MockStore` keeps everything in memory for tests.

mod kube_store;
#[cfg(test)]
mod mock;

pub use kube_store::KubeStore;
#[cfg(test)]
pub use mock::MockStore;

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::CustomClusterStatus;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};

/// Namespaced object access used by a reconcile pass.
///
/// Deletes are idempotent: removing an object that does not exist succeeds.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ControllerError>;

    /// Creates the ConfigMap or replaces the existing one with the same name.
    async fn apply_config_map(&self, namespace: &str, config_map: ConfigMap) -> Result<(), ControllerError>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    /// Lists jobs matching a `key=value[,key=value]` label selector.
    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> Result<Vec<Job>, ControllerError>;

    /// Creates a job; fails with a conflict if the name is taken.
    async fn create_job(&self, namespace: &str, job: Job) -> Result<Job, ControllerError>;

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ControllerError>;

    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<(), ControllerError>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CustomClusterStatus,
    ) -> Result<(), ControllerError>;

    /// Replaces the finalizer list on the CustomCluster object.
    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), ControllerError>;
}
