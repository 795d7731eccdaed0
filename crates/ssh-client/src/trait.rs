//! RemoteFileFetcher trait for mocking
//!
//! The concrete `SshClient` implements this trait; tests use the in-memory
//! mock behind the `test-util` feature.

use crate::error::SshError;

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Pinned `SHA256:` host key fingerprint; `None` accepts any key
    pub host_key_fingerprint: Option<String>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            host_key_fingerprint: None,
        }
    }

    /// Only accept a server presenting the host key with `fingerprint`
    pub fn with_host_key_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.host_key_fingerprint = fingerprint;
        self
    }
}

/// Whether a server key fingerprint satisfies the pinned one.
///
/// Both sides are compared without the `SHA256:` prefix and base64 padding.
pub fn host_key_matches(pinned: Option<&str>, presented: &str) -> bool {
    fn normalize(fingerprint: &str) -> &str {
        let trimmed = fingerprint.trim();
        trimmed
            .strip_prefix("SHA256:")
            .unwrap_or(trimmed)
            .trim_end_matches('=')
    }
    pinned.is_none_or(|pinned| normalize(pinned) == normalize(presented))
}

/// Trait for single-file remote downloads
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait RemoteFileFetcherTrait: Send + Sync {
    /// Download the file at the absolute `remote_path` on `target`
    async fn fetch_file(
        &self,
        target: &SshTarget,
        private_key_pem: &str,
        remote_path: &str,
    ) -> Result<Vec<u8>, SshError>;
}
