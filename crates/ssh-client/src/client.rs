//! SSH/SFTP client
//!
//! One connection per download: connect, authenticate with the key, open the
//! `sftp` subsystem on a session channel, read the file, disconnect.

use crate::error::SshError;
use crate::fetcher_trait::{host_key_matches, RemoteFileFetcherTrait, SshTarget};
use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_keys::key;
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Checks the server key against the target's pinned fingerprint.
///
/// Without a pinned fingerprint any key is accepted; there is no known_hosts
/// source for machines the cluster owner declares.
struct HostKeyCheck {
    host: String,
    pinned: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let presented = server_public_key.fingerprint();
        match &self.pinned {
            None => {
                debug!("Accepting unverified host key SHA256:{} from {}", presented, self.host);
                Ok(true)
            }
            Some(pinned) if host_key_matches(Some(pinned), &presented) => {
                debug!("Host key SHA256:{} from {} matches", presented, self.host);
                Ok(true)
            }
            Some(pinned) => Err(SshError::HostKeyMismatch {
                host: self.host.clone(),
                expected: pinned.clone(),
                presented,
            }),
        }
    }
}

/// SSH/SFTP client
pub struct SshClient {
    timeout: Duration,
}

impl SshClient {
    /// Create a client whose downloads are bounded by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn download(
        &self,
        target: &SshTarget,
        private_key_pem: &str,
        remote_path: &str,
    ) -> Result<Vec<u8>, SshError> {
        let key_pair = russh_keys::decode_secret_key(private_key_pem, None)?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.timeout),
            ..Default::default()
        });

        debug!("Connecting to {}@{}:{}", target.user, target.host, target.port);
        let check = HostKeyCheck {
            host: target.host.clone(),
            pinned: target.host_key_fingerprint.clone(),
        };
        let mut session = client::connect(config, (target.host.as_str(), target.port), check).await?;

        if !session
            .authenticate_publickey(target.user.clone(), Arc::new(key_pair))
            .await?
        {
            return Err(SshError::Authentication {
                user: target.user.clone(),
                host: target.host.clone(),
            });
        }

        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;

        debug!("Reading {} from {}", remote_path, target.host);
        let contents = sftp.read(remote_path).await?;

        if let Err(e) = sftp.close().await {
            warn!("Failed to close SFTP session to {}: {}", target.host, e);
        }
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            warn!("Failed to disconnect from {}: {}", target.host, e);
        }

        Ok(contents)
    }
}

#[async_trait]
impl RemoteFileFetcherTrait for SshClient {
    async fn fetch_file(
        &self,
        target: &SshTarget,
        private_key_pem: &str,
        remote_path: &str,
    ) -> Result<Vec<u8>, SshError> {
        tokio::time::timeout(self.timeout, self.download(target, private_key_pem, remote_path))
            .await
            .map_err(|_| SshError::Timeout(self.timeout))?
    }
}
