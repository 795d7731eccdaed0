//! Main controller implementation.
//!
//! Wires the Kubernetes client, SSH client and metrics registry into a
//! `Reconciler`, then runs the CustomCluster watcher next to the probe
//! server until either exits.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::{serve_probes, Metrics};
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::Watcher;
use crds::CustomCluster;
use k8s_openapi::api::batch::v1::Job;
use kube::{Api, Client};
use ssh_client::SshClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for CustomCluster lifecycle management.
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing CustomCluster Controller");

        let kube_client = Client::try_default().await?;

        let (cluster_api, job_api): (Api<CustomCluster>, Api<Job>) = match config.namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client.clone())),
        };

        let metrics = Arc::new(Metrics::new()?);
        let reconciler = Arc::new(Reconciler::new(
            KubeStore::new(kube_client),
            SshClient::new(config.ssh_timeout),
            metrics.clone(),
            config.installer_ssh_secret.clone(),
        ));

        let probe_server = tokio::spawn(serve_probes(config.probe_addr, metrics));

        let watcher = Watcher::new(reconciler, cluster_api, job_api, config);
        let cluster_watcher = tokio::spawn(async move { watcher.watch_custom_clusters().await });

        Ok(Self {
            cluster_watcher,
            probe_server,
        })
    }

    /// Runs until the watcher or the probe server exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("CustomCluster Controller running");

        // Both tasks run forever; either one returning is fatal
        tokio::select! {
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("CustomCluster watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("CustomCluster watcher error: {}", e)))?;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
