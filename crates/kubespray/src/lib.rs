//! Kubespray Installer Support
//!
//! Everything the operator needs to know about the external installer, with no
//! I/O of its own:
//!
//! - **Inventory codec**: render and parse the Ansible INI host inventory
//! - **Config codec**: render the `k8s-cluster.yml` key/value file and recover
//!   the recorded Kubernetes version from it
//! - **Commands**: the exact `ansible-playbook` command line per action
//! - **Images**: installer image selection by Kubernetes version
//! - **Versions**: `KubeVersion` and the single-minor-step upgrade gate
//!
//! # Example
//!
//! ```
//! use kubespray::{Host, Inventory};
//!
//! let masters = vec![Host::new("master1", "1.1.1.1", "10.0.0.1")];
//! let workers = vec![Host::new("node1", "1.1.1.2", "10.0.0.2")];
//! let text = Inventory::new(&masters, &workers).unwrap().render();
//!
//! assert_eq!(kubespray::parse_workers(&text).unwrap(), workers);
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod image;
pub mod inventory;
pub mod version;

pub use command::*;
pub use config::*;
pub use error::KubesprayError;
pub use image::*;
pub use inventory::*;
pub use version::*;
