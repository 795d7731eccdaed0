//! Kubespray codec errors

use thiserror::Error;

/// Errors raised while parsing installer artifacts or versions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KubesprayError {
    /// Version string is not `[v]MAJOR.MINOR.PATCH`
    #[error("Invalid Kubernetes version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Inventory text is structurally unexpected
    #[error("Inventory parse error at line {line}: {reason}")]
    InventoryParse { line: usize, reason: String },

    /// Host cannot be written to the inventory and read back unchanged
    #[error("Invalid host '{name}': {reason}")]
    InvalidHost { name: String, reason: String },

    /// A required inventory section is absent
    #[error("Inventory is missing section [{0}]")]
    MissingSection(String),

    /// A required config key is absent
    #[error("Config is missing key '{0}'")]
    MissingKey(String),
}
