//! Mock RemoteFileFetcher for unit testing
//!
//! Serves files from memory keyed by host and path, and records every
//! connection attempt.

use crate::error::SshError;
use crate::fetcher_trait::{host_key_matches, RemoteFileFetcherTrait, SshTarget};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock fetcher for testing
#[derive(Clone, Default)]
pub struct MockRemoteFileFetcher {
    files: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    failure: Arc<Mutex<Option<String>>>,
    host_keys: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<SshTarget>>>,
}

impl MockRemoteFileFetcher {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `contents` for `path` on `host` (for test setup)
    pub fn add_file(&self, host: &str, path: &str, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert((host.to_string(), path.to_string()), contents.into());
    }

    /// Present the host key with `fingerprint` (bare base64) from `host`
    pub fn set_host_key(&self, host: &str, fingerprint: &str) {
        self.host_keys
            .lock()
            .unwrap()
            .insert(host.to_string(), fingerprint.to_string());
    }

    /// Make every fetch fail with an authentication error naming `reason`
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }

    /// Let fetches succeed again
    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Targets contacted so far
    pub fn calls(&self) -> Vec<SshTarget> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteFileFetcherTrait for MockRemoteFileFetcher {
    async fn fetch_file(
        &self,
        target: &SshTarget,
        _private_key_pem: &str,
        remote_path: &str,
    ) -> Result<Vec<u8>, SshError> {
        self.calls.lock().unwrap().push(target.clone());

        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(SshError::Authentication {
                user: target.user.clone(),
                host: format!("{} ({})", target.host, reason),
            });
        }

        let presented = self.host_keys.lock().unwrap().get(&target.host).cloned();
        if let (Some(pinned), Some(presented)) = (&target.host_key_fingerprint, presented) {
            if !host_key_matches(Some(pinned), &presented) {
                return Err(SshError::HostKeyMismatch {
                    host: target.host.clone(),
                    expected: pinned.clone(),
                    presented,
                });
            }
        }

        self.files
            .lock()
            .unwrap()
            .get(&(target.host.clone(), remote_path.to_string()))
            .cloned()
            .ok_or_else(|| SshError::NotFound(format!("{}:{}", target.host, remote_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_registered_file() {
        let mock = MockRemoteFileFetcher::new();
        mock.add_file("1.1.1.1", "/etc/kubernetes/admin.conf", "apiVersion: v1");
        let target = SshTarget::new("1.1.1.1", 22, "root");

        let contents = mock
            .fetch_file(&target, "key", "/etc/kubernetes/admin.conf")
            .await
            .unwrap();
        assert_eq!(contents, b"apiVersion: v1");
        assert_eq!(mock.calls(), vec![target]);
    }

    #[tokio::test]
    async fn test_mock_enforces_pinned_host_key() {
        let mock = MockRemoteFileFetcher::new();
        mock.add_file("1.1.1.1", "/etc/kubernetes/admin.conf", "apiVersion: v1");
        mock.set_host_key("1.1.1.1", "abc123");

        let pinned = SshTarget::new("1.1.1.1", 22, "root").with_host_key_fingerprint(Some("SHA256:abc123".to_string()));
        assert!(mock.fetch_file(&pinned, "key", "/etc/kubernetes/admin.conf").await.is_ok());

        let wrong = pinned.with_host_key_fingerprint(Some("SHA256:other".to_string()));
        assert!(matches!(
            mock.fetch_file(&wrong, "key", "/etc/kubernetes/admin.conf").await,
            Err(SshError::HostKeyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_missing_file_and_failure() {
        let mock = MockRemoteFileFetcher::new();
        let target = SshTarget::new("1.1.1.1", 22, "root");
        assert!(matches!(
            mock.fetch_file(&target, "key", "/nope").await,
            Err(SshError::NotFound(_))
        ));

        mock.add_file("1.1.1.1", "/nope", "x");
        mock.fail_with("connection refused");
        assert!(matches!(
            mock.fetch_file(&target, "key", "/nope").await,
            Err(SshError::Authentication { .. })
        ));
    }
}
