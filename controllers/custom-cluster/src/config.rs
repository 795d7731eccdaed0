//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Default name of the secret holding the installer's SSH key.
pub const DEFAULT_INSTALLER_SSH_SECRET: &str = "kubespray-ssh-key";

/// Runtime settings for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,
    /// Fixed-name secret mounted into every installer job at `/auth`
    pub installer_ssh_secret: String,
    /// Maximum number of clusters reconciled at once
    pub concurrency: u16,
    /// Quiet period after the last event before a pass runs
    pub debounce: Duration,
    /// Upper bound on one credential retrieval
    pub ssh_timeout: Duration,
    /// Listen address for `/healthz`, `/readyz` and `/metrics`
    pub probe_addr: SocketAddr,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            installer_ssh_secret: DEFAULT_INSTALLER_SSH_SECRET.to_string(),
            concurrency: 4,
            debounce: Duration::from_secs(5),
            ssh_timeout: Duration::from_secs(30),
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl ControllerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let concurrency = match lookup("RECONCILE_CONCURRENCY") {
            Some(raw) => parse_number::<u16>("RECONCILE_CONCURRENCY", &raw)?,
            None => defaults.concurrency,
        };
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let debounce = match lookup("RECONCILE_DEBOUNCE_SECS") {
            Some(raw) => Duration::from_secs(parse_number("RECONCILE_DEBOUNCE_SECS", &raw)?),
            None => defaults.debounce,
        };

        let ssh_timeout = match lookup("SSH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("SSH_TIMEOUT_SECS", &raw)?),
            None => defaults.ssh_timeout,
        };

        let probe_addr = match lookup("PROBE_BIND_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                ControllerError::InvalidConfig(format!("PROBE_BIND_ADDR '{}': {}", raw, e))
            })?,
            None => defaults.probe_addr,
        };

        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            installer_ssh_secret: lookup("INSTALLER_SSH_SECRET")
                .filter(|name| !name.is_empty())
                .unwrap_or(defaults.installer_ssh_secret),
            concurrency,
            debounce,
            ssh_timeout,
            probe_addr,
        })
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ControllerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ControllerError::InvalidConfig(format!("{} '{}': {}", key, raw, e)))
}
