//! KubeOperator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for bring-your-own-hosts clusters.

pub mod conditions;
pub mod custom_cluster;
pub mod machine;
pub mod references;

pub use conditions::*;
pub use custom_cluster::*;
pub use machine::*;
pub use references::*;
