//! Installer image selection
//!
//! Kubespray releases support a bounded window of Kubernetes versions, so
//! the image is picked from the target version.

use crate::version::KubeVersion;
use semver::Version;

/// Image for Kubernetes releases before [`INSTALLER_IMAGE_BOUNDARY`]
pub const LEGACY_INSTALLER_IMAGE: &str = "quay.io/kubespray/kubespray:v2.14.2";

/// Image for Kubernetes releases from [`INSTALLER_IMAGE_BOUNDARY`] onwards
pub const INSTALLER_IMAGE: &str = "quay.io/kubespray/kubespray:v2.16.0";

/// First Kubernetes version handled by [`INSTALLER_IMAGE`]
pub const INSTALLER_IMAGE_BOUNDARY: (u64, u64, u64) = (1, 19, 0);

/// Installer image able to install or upgrade to `version`
pub fn installer_image(version: &KubeVersion) -> &'static str {
    let (major, minor, patch) = INSTALLER_IMAGE_BOUNDARY;
    if version.as_semver() < &Version::new(major, minor, patch) {
        LEGACY_INSTALLER_IMAGE
    } else {
        INSTALLER_IMAGE
    }
}
