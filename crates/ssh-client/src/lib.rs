//! SSH File Retrieval Client
//!
//! Downloads a single file from a remote host over SFTP, authenticating with
//! a private key. Used to fetch the admin kubeconfig the installer leaves on
//! the first control-plane host.
//!
//! # Example
//!
//! ```no_run
//! use ssh_client::{RemoteFileFetcherTrait, SshClient, SshTarget};
//! use std::time::Duration;
//!
//! # async fn example(private_key_pem: &str) -> Result<(), ssh_client::SshError> {
//! let client = SshClient::new(Duration::from_secs(30));
//! let target = SshTarget::new("203.0.113.10", 22, "root");
//! let kubeconfig = client
//!     .fetch_file(&target, private_key_pem, "/etc/kubernetes/admin.conf")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod fetcher_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::SshClient;
pub use error::SshError;
pub use fetcher_trait::{host_key_matches, RemoteFileFetcherTrait, SshTarget};
#[cfg(feature = "test-util")]
pub use mock::MockRemoteFileFetcher;
