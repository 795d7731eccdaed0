//! Admin kubeconfig retrieval from the first control-plane host.
//!
//! Runs on every pass that leaves the cluster `Provisioned` until the
//! credential secret exists. Failures are recorded on the
//! `CredentialsRetrieved` condition and never move the phase.

use super::artifacts::{kubeconfig_secret_name, owned_metadata, ARTIFACT_LABEL, KUBECONFIG_KEY};
use super::conditions;
use super::Reconciler;
use crate::error::ControllerError;
use crds::{CustomCluster, CustomClusterStatus, SecretReference};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use ssh_client::SshTarget;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Kubeconfig written by kubeadm on every control-plane host
pub const ADMIN_KUBECONFIG_PATH: &str = "/etc/kubernetes/admin.conf";

impl Reconciler {
    /// Makes sure the credential secret exists and status points at it.
    pub(crate) async fn ensure_credentials(
        &self,
        cluster: &CustomCluster,
        namespace: &str,
        name: &str,
        status: &mut CustomClusterStatus,
    ) -> Result<(), ControllerError> {
        let secret_name = kubeconfig_secret_name(name);
        let secret_ref = SecretReference {
            name: secret_name.clone(),
            namespace: Some(namespace.to_string()),
        };

        if self.store.get_secret(namespace, &secret_name).await?.is_some() {
            debug!("Credential secret {}/{} already present", namespace, secret_name);
            status.kubeconfig_secret_ref = Some(secret_ref);
            status.set_condition(conditions::credentials_retrieved(&secret_name));
            return Ok(());
        }

        match self.retrieve_credentials(cluster, namespace, &secret_name).await {
            Ok(()) => {
                info!(
                    "Stored admin kubeconfig for {}/{} in {}",
                    namespace, name, secret_name
                );
                self.metrics.credential_retrievals.with_label_values(&["succeeded"]).inc();
                status.kubeconfig_secret_ref = Some(secret_ref);
                status.set_condition(conditions::credentials_retrieved(&secret_name));
            }
            Err(e) => {
                warn!(
                    "Credential retrieval for {}/{} failed, retrying next pass: {}",
                    namespace, name, e
                );
                self.metrics.credential_retrievals.with_label_values(&["failed"]).inc();
                status.set_condition(conditions::credentials_failed(&e.to_string()));
            }
        }
        Ok(())
    }

    async fn retrieve_credentials(
        &self,
        cluster: &CustomCluster,
        namespace: &str,
        secret_name: &str,
    ) -> Result<(), ControllerError> {
        let spec = &cluster.spec;
        let master = spec
            .masters
            .first()
            .ok_or_else(|| ControllerError::InvalidDescriptor("no master declared".to_string()))?;

        let private_key = self.read_private_key(cluster, namespace).await?;
        let target = SshTarget::new(&master.public_address, spec.ssh_port, &spec.ssh_user)
            .with_host_key_fingerprint(spec.ssh_host_key_fingerprint.clone());
        let kubeconfig = self
            .fetcher
            .fetch_file(&target, &private_key, ADMIN_KUBECONFIG_PATH)
            .await?;
        if kubeconfig.is_empty() {
            return Err(ControllerError::Credentials(format!(
                "{} on {} is empty",
                ADMIN_KUBECONFIG_PATH, master.hostname
            )));
        }

        let secret = Secret {
            metadata: owned_metadata(cluster, secret_name.to_string(), (ARTIFACT_LABEL, "kubeconfig")),
            data: Some(BTreeMap::from([(KUBECONFIG_KEY.to_string(), ByteString(kubeconfig))])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        match self.store.create_secret(namespace, secret).await {
            // Stored by a concurrent pass
            Err(ControllerError::Conflict(_)) => Ok(()),
            other => other,
        }
    }

    async fn read_private_key(&self, cluster: &CustomCluster, namespace: &str) -> Result<String, ControllerError> {
        let key_ref = &cluster.spec.ssh_key_secret_ref;
        let secret = self
            .store
            .get_secret(namespace, &key_ref.name)
            .await?
            .ok_or_else(|| ControllerError::Credentials(format!("SSH key secret {} not found", key_ref.name)))?;

        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key_ref.key_or_default()))
            .map(|value| value.0.clone())
            .ok_or_else(|| {
                ControllerError::Credentials(format!(
                    "SSH key secret {} has no key {}",
                    key_ref.name,
                    key_ref.key_or_default()
                ))
            })?;

        String::from_utf8(bytes).map_err(|e| {
            ControllerError::Credentials(format!("SSH key in secret {} is not UTF-8: {}", key_ref.name, e))
        })
    }
}
