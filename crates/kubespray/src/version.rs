//! Kubernetes versions and the upgrade compatibility gate
//!
//! kubeadm, which the installer drives, only supports moving one minor
//! version at a time. The gate rejects anything else before a job starts.

use crate::error::KubesprayError;
use semver::Version;
use std::fmt;
use tracing::debug;

/// A parsed Kubernetes version.
///
/// Accepts input with or without a leading `v` and always displays with a
/// single `v`, so `"1.18.0"` and `"v1.18.0"` are the same version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KubeVersion(Version);

impl KubeVersion {
    pub fn parse(raw: &str) -> Result<Self, KubesprayError> {
        Version::parse(strip_version_prefix(raw.trim()))
            .map(Self)
            .map_err(|e| KubesprayError::InvalidVersion {
                version: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Version without the `v` prefix
    pub fn bare(&self) -> String {
        self.0.to_string()
    }

    pub fn as_semver(&self) -> &Version {
        &self.0
    }
}

impl fmt::Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Strip one leading `v` from a version string
pub fn strip_version_prefix(raw: &str) -> &str {
    raw.strip_prefix('v').unwrap_or(raw)
}

/// Whether two version strings name different versions.
///
/// Plain string comparison after stripping the prefix, so unparsable input is
/// still compared rather than silently treated as equal.
pub fn versions_differ(declared: &str, provisioned: &str) -> bool {
    strip_version_prefix(declared.trim()) != strip_version_prefix(provisioned.trim())
}

/// Whether moving from `current` to `target` is a supported upgrade step.
///
/// Same major version, and a minor distance of at most one in either
/// direction. Unparsable input is rejected.
pub fn is_upgrade_supported(current: &str, target: &str) -> bool {
    let (current, target) = match (KubeVersion::parse(current), KubeVersion::parse(target)) {
        (Ok(current), Ok(target)) => (current, target),
        (Err(e), _) | (_, Err(e)) => {
            debug!("Rejecting upgrade with unparsable version: {}", e);
            return false;
        }
    };

    let (current, target) = (current.as_semver(), target.as_semver());
    if current.major != target.major {
        return false;
    }
    current.minor.abs_diff(target.minor) <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_prefix() {
        let with = KubeVersion::parse("v1.18.0").unwrap();
        let without = KubeVersion::parse("1.18.0").unwrap();
        assert_eq!(with, without);
        assert_eq!(with.to_string(), "v1.18.0");
        assert_eq!(with.bare(), "1.18.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(KubeVersion::parse("invalid").is_err());
        assert!(KubeVersion::parse("v1.18").is_err());
        assert!(KubeVersion::parse("").is_err());
    }

    #[test]
    fn test_versions_differ() {
        assert!(!versions_differ("v1.18.0", "1.18.0"));
        assert!(!versions_differ("v1.18.0", "v1.18.0"));
        assert!(versions_differ("v1.18.1", "v1.18.0"));
    }

    #[test]
    fn test_upgrade_gate() {
        assert!(is_upgrade_supported("v1.18.0", "v1.18.1"));
        assert!(is_upgrade_supported("v1.18.0", "v1.19.0"));
        assert!(!is_upgrade_supported("v1.18.0", "v1.20.0"));
        assert!(!is_upgrade_supported("invalid", "v1.18.1"));
    }

    #[test]
    fn test_upgrade_gate_direction_and_major() {
        assert!(is_upgrade_supported("1.19.3", "1.18.0"));
        assert!(!is_upgrade_supported("1.20.0", "1.18.0"));
        assert!(!is_upgrade_supported("1.18.0", "2.18.0"));
        assert!(!is_upgrade_supported("v1.18.0", "not-a-version"));
    }
}
