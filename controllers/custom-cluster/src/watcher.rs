//! Kubernetes resource watcher.
//!
//! Drives `Reconciler::reconcile_custom_cluster` from a
//! kube_runtime::Controller. Installer jobs carry a controller owner
//! reference, so a job changing state wakes its cluster without polling.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::artifacts::{MANAGED_BY, MANAGED_BY_LABEL};
use crate::reconciler::Reconciler;
use crds::CustomCluster;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::Api;
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, error, info};

fn resource_key(cluster: &CustomCluster) -> String {
    format!(
        "{}/{}",
        cluster.metadata.namespace.as_deref().unwrap_or("default"),
        cluster.metadata.name.as_deref().unwrap_or_default()
    )
}

async fn reconcile(cluster: Arc<CustomCluster>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let key = resource_key(&cluster);
    debug!("Reconciling CustomCluster {}", key);

    match reconciler.reconcile_custom_cluster(&cluster).await {
        Ok(next) => {
            reconciler.reset_backoff(&key);
            reconciler.metrics.record_reconciliation(None);
            Ok(Action::requeue(next.requeue_after()))
        }
        Err(e) => {
            reconciler.metrics.record_reconciliation(Some(&e));
            Err(e)
        }
    }
}

fn error_policy(cluster: Arc<CustomCluster>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let key = resource_key(&cluster);
    let delay = reconciler.error_backoff(&key, error);
    error!(
        "Reconciliation error for CustomCluster {}: {} (retrying in {:?})",
        key, error, delay
    );
    Action::requeue(delay)
}

/// Watches CustomCluster resources and the jobs they own.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    cluster_api: Api<CustomCluster>,
    job_api: Api<Job>,
    config: ControllerConfig,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        cluster_api: Api<CustomCluster>,
        job_api: Api<Job>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            reconciler,
            cluster_api,
            job_api,
            config,
        }
    }

    /// Runs until the watch stream ends.
    pub async fn watch_custom_clusters(&self) -> Result<(), ControllerError> {
        info!("Starting CustomCluster watcher");

        // Debounce batches our own status writes with the events they cause
        let runtime_config = RuntimeConfig::default()
            .debounce(self.config.debounce)
            .concurrency(self.config.concurrency);
        let job_selector = format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY);

        Controller::new(self.cluster_api.clone(), watcher::Config::default())
            .owns(self.job_api.clone(), watcher::Config::default().labels(&job_selector))
            .with_config(runtime_config)
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled CustomCluster {}", object.name),
                    Err(e) => error!("Controller error for CustomCluster: {}", e),
                }
            })
            .await;

        Ok(())
    }
}
