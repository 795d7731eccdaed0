//! CustomCluster Controller
//!
//! Lifecycle controller for Kubernetes clusters installed onto
//! bring-your-own hosts:
//! - Provisions a cluster by running the Kubespray installer as a Job
//! - Scales workers up and down, one action per job
//! - Upgrades one minor version at a time
//! - Retrieves the admin kubeconfig over SSH into a Secret
//! - Resets the hosts when the CustomCluster is deleted
//!
//! The committed inventory and config ConfigMaps are the record of what
//! was installed; every decision is re-derived from them on each pass.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls client needs a process-wide crypto provider; a second install is a no-op
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting CustomCluster Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Installer SSH secret: {}", config.installer_ssh_secret);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Probe address: {}", config.probe_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
