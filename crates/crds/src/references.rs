//! Kubernetes object references used by CustomCluster
//!
//! Follows the Kubernetes `SecretKeySelector`/`SecretReference` shapes so the
//! references read the same way as the built-in ones.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Key that holds an SSH private key in a `kubernetes.io/ssh-auth` secret
pub const DEFAULT_SSH_PRIVATE_KEY: &str = "ssh-privatekey";

/// Reference to a single key of a Secret in the cluster's namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyReference {
    /// Name of the Secret
    pub name: String,

    /// Key within the Secret (defaults to `ssh-privatekey`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl SecretKeyReference {
    /// Create a reference to the default SSH private key entry of `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }

    /// Key to read, falling back to the ssh-auth default
    pub fn key_or_default(&self) -> &str {
        self.key.as_deref().unwrap_or(DEFAULT_SSH_PRIVATE_KEY)
    }
}

/// Reference to a whole Secret
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret (defaults to the cluster's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
