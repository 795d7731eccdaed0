//! Controller-specific error types.
//!
//! Errors raised by the CustomCluster controller that are not covered by
//! upstream library errors. Codec and SSH failures are wrapped so a single
//! `?` carries them out of a reconcile pass.

use kube::Error as KubeError;
use kubespray::KubesprayError;
use ssh_client::SshError;
use thiserror::Error;

/// Errors that can occur in the CustomCluster Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// SSH/SFTP error during credential retrieval
    #[error("SSH error: {0}")]
    Ssh(#[from] SshError),

    /// Inventory or config artifact could not be rendered or parsed
    #[error("Artifact codec error: {0}")]
    Codec(#[from] KubesprayError),

    /// Cluster descriptor is malformed and needs user correction
    #[error("Invalid cluster descriptor: {0}")]
    InvalidDescriptor(String),

    /// A committed or staged artifact is missing after the cluster was provisioned
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// Credential secret is missing or unusable
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Store write lost a race with another writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe/metrics server failed
    #[error("Probe server error: {0}")]
    Io(#[from] std::io::Error),

    /// Metric registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ControllerError {
    /// Errors the user has to fix in the descriptor; retrying sooner does not help.
    pub fn is_input_error(&self) -> bool {
        matches!(self, ControllerError::InvalidDescriptor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(ControllerError::InvalidDescriptor("no masters".to_string()).is_input_error());
        assert!(!ControllerError::Conflict("job exists".to_string()).is_input_error());
        assert!(!ControllerError::MissingArtifact("demo-inventory".to_string()).is_input_error());
    }
}
