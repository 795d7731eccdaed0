//! SSH client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a remote file
#[derive(Debug, Error)]
pub enum SshError {
    /// Private key could not be decoded
    #[error("Invalid private key: {0}")]
    Key(#[from] russh_keys::Error),

    /// Transport or channel failure
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// SFTP subsystem failure
    #[error("SFTP error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// Server refused the key
    #[error("Authentication rejected for {user}@{host}")]
    Authentication { user: String, host: String },

    /// Server presented a host key other than the pinned one
    #[error("Host key mismatch for {host}: expected {expected}, got SHA256:{presented}")]
    HostKeyMismatch {
        host: String,
        expected: String,
        presented: String,
    },

    /// Exchange did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Remote file does not exist
    #[error("Remote file not found: {0}")]
    NotFound(String),
}
