//! Installer command lines
//!
//! The strings built here are the contract with the installer image and must
//! match its CLI exactly:
//!
//! `ansible-playbook -i inventory/<host-file> --private-key <key> <playbook>.yml -vvv [extra flags]`
//!
//! Every segment is followed by a single space, including the last one.

use crate::version::KubeVersion;

pub const INSTALLER_BINARY: &str = "ansible-playbook";

/// Working directory of the installer inside its image
pub const INSTALLER_WORKDIR: &str = "/kubespray";

/// Inventory file, relative to `<workdir>/inventory`
pub const HOST_FILE: &str = "cluster/hosts.ini";

/// Group variables file, relative to `<workdir>/inventory`
pub const CONFIG_FILE: &str = "cluster/group_vars/k8s_cluster/k8s-cluster.yml";

/// Directory the SSH credential secret is mounted at
pub const SSH_KEY_DIR: &str = "/auth";

/// Private key path passed to the installer
pub const PRIVATE_KEY_PATH: &str = "/auth/ssh-privatekey";

/// Installer playbooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playbook {
    /// Fresh install
    Cluster,
    /// Join new nodes
    Scale,
    /// Drain and remove nodes
    RemoveNode,
    /// Rolling version upgrade
    UpgradeCluster,
    /// Tear everything down
    Reset,
}

impl Playbook {
    pub fn file_name(&self) -> &'static str {
        match self {
            Playbook::Cluster => "cluster.yml",
            Playbook::Scale => "scale.yml",
            Playbook::RemoveNode => "remove-node.yml",
            Playbook::UpgradeCluster => "upgrade-cluster.yml",
            Playbook::Reset => "reset.yml",
        }
    }
}

fn playbook_command(playbook: Playbook) -> String {
    format!(
        "{} -i inventory/{} --private-key {} {} -vvv ",
        INSTALLER_BINARY,
        HOST_FILE,
        PRIVATE_KEY_PATH,
        playbook.file_name()
    )
}

/// Install the cluster from scratch
pub fn init_command() -> String {
    playbook_command(Playbook::Cluster)
}

/// Join every inventory host not yet part of the cluster
pub fn scale_up_command() -> String {
    playbook_command(Playbook::Scale)
}

/// Remove the named nodes, in the given order
pub fn scale_down_command(nodes: &[String]) -> String {
    format!(
        "{}--extra-vars \"node={}\" ",
        playbook_command(Playbook::RemoveNode),
        nodes.join(",")
    )
}

/// Upgrade the cluster to `target`
pub fn upgrade_command(target: &KubeVersion) -> String {
    format!(
        "{}-e kube_version={} ",
        playbook_command(Playbook::UpgradeCluster),
        target
    )
}

/// Reset every host without prompting
pub fn reset_command() -> String {
    format!("{}-e reset_confirmation=yes ", playbook_command(Playbook::Reset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_command() {
        assert_eq!(
            init_command(),
            "ansible-playbook -i inventory/cluster/hosts.ini --private-key /auth/ssh-privatekey cluster.yml -vvv "
        );
    }

    #[test]
    fn test_scale_down_single_node() {
        let command = scale_down_command(&["node1".to_string()]);
        assert!(command.ends_with("--extra-vars \"node=node1\" "));
        assert!(command.contains(" remove-node.yml -vvv "));
    }

    #[test]
    fn test_scale_down_keeps_declared_order() {
        let nodes = vec!["node1".to_string(), "node2".to_string(), "node3".to_string()];
        assert!(scale_down_command(&nodes).ends_with("--extra-vars \"node=node1,node2,node3\" "));
    }

    #[test]
    fn test_upgrade_command_reprefixes_version() {
        let bare = KubeVersion::parse("1.19.0").unwrap();
        let prefixed = KubeVersion::parse("v1.19.0").unwrap();
        assert!(upgrade_command(&bare).ends_with("upgrade-cluster.yml -vvv -e kube_version=v1.19.0 "));
        assert_eq!(upgrade_command(&bare), upgrade_command(&prefixed));
    }

    #[test]
    fn test_reset_and_scale_up_commands() {
        assert!(reset_command().ends_with("reset.yml -vvv -e reset_confirmation=yes "));
        assert!(scale_up_command().ends_with("scale.yml -vvv "));
    }
}
