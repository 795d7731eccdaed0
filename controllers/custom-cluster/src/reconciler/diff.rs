//! Declared vs. provisioned state comparison.
//!
//! Node identity is the host name only. Address drift on an existing host
//! name is not a change.

use kubespray::{strip_version_prefix, versions_differ, Host};
use std::collections::HashSet;

/// Worker additions and removals between two node sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerDiff {
    /// Declared but not provisioned, in declared order
    pub to_add: Vec<Host>,
    /// Provisioned but not declared, in provisioned order
    pub to_remove: Vec<Host>,
}

impl WorkerDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Computes `(toAdd, toRemove)` between the declared and provisioned workers.
pub fn diff_workers(declared: &[Host], provisioned: &[Host]) -> WorkerDiff {
    let declared_names: HashSet<&str> = declared.iter().map(|h| h.name.as_str()).collect();
    let provisioned_names: HashSet<&str> = provisioned.iter().map(|h| h.name.as_str()).collect();

    WorkerDiff {
        to_add: declared
            .iter()
            .filter(|h| !provisioned_names.contains(h.name.as_str()))
            .cloned()
            .collect(),
        to_remove: provisioned
            .iter()
            .filter(|h| !declared_names.contains(h.name.as_str()))
            .cloned()
            .collect(),
    }
}

/// The single change a reconcile pass acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    None,
    ScaleUp(Vec<Host>),
    ScaleDown(Vec<Host>),
    Upgrade { from: String, to: String },
}

/// Reduces the worker and version differences to one action.
///
/// Additions win over removals, and the version is only compared once the
/// worker sets agree, so one job never changes both.
pub fn compute_delta(
    declared_workers: &[Host],
    provisioned_workers: &[Host],
    declared_version: &str,
    provisioned_version: &str,
) -> Delta {
    let workers = diff_workers(declared_workers, provisioned_workers);
    if !workers.to_add.is_empty() {
        return Delta::ScaleUp(workers.to_add);
    }
    if !workers.to_remove.is_empty() {
        return Delta::ScaleDown(workers.to_remove);
    }
    if versions_differ(declared_version, provisioned_version) {
        return Delta::Upgrade {
            from: format!("v{}", strip_version_prefix(provisioned_version)),
            to: format!("v{}", strip_version_prefix(declared_version)),
        };
    }
    Delta::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> Host {
        Host::new(name, format!("203.0.113.{}", name.len()), format!("10.0.0.{}", name.len()))
    }

    fn names(hosts: &[Host]) -> Vec<&str> {
        hosts.iter().map(|h| h.name.as_str()).collect()
    }

    #[test]
    fn test_diff_equal_sets_is_empty() {
        let a = vec![host("node1"), host("node2")];
        assert!(diff_workers(&a, &a).is_empty());
        assert!(diff_workers(&[], &[]).is_empty());
    }

    #[test]
    fn test_diff_symmetry() {
        let a = vec![host("node1"), host("node2"), host("node4")];
        let b = vec![host("node2"), host("node3")];

        let ab = diff_workers(&a, &b);
        let ba = diff_workers(&b, &a);
        assert_eq!(ab.to_add, ba.to_remove);
        assert_eq!(ab.to_remove, ba.to_add);
        assert_eq!(names(&ab.to_add), vec!["node1", "node4"]);
        assert_eq!(names(&ab.to_remove), vec!["node3"]);
    }

    #[test]
    fn test_scale_to_zero_removes_everything() {
        let provisioned = vec![host("node1"), host("node2")];
        let diff = diff_workers(&[], &provisioned);
        assert!(diff.to_add.is_empty());
        assert_eq!(names(&diff.to_remove), vec!["node1", "node2"]);
    }

    #[test]
    fn test_address_change_is_not_a_diff() {
        let declared = vec![Host::new("node1", "198.51.100.7", "10.1.0.7")];
        let provisioned = vec![Host::new("node1", "203.0.113.7", "10.0.0.7")];
        assert!(diff_workers(&declared, &provisioned).is_empty());
    }

    #[test]
    fn test_delta_prefers_additions() {
        let declared = vec![host("node1"), host("nodeX")];
        let provisioned = vec![host("node1"), host("node2")];
        match compute_delta(&declared, &provisioned, "v1.18.0", "v1.18.0") {
            Delta::ScaleUp(hosts) => assert_eq!(names(&hosts), vec!["nodeX"]),
            other => panic!("expected scale-up, got {:?}", other),
        }
    }

    #[test]
    fn test_delta_version_only_after_workers_agree() {
        let workers = vec![host("node1")];
        assert_eq!(
            compute_delta(&workers, &[], "v1.19.0", "v1.18.0"),
            Delta::ScaleUp(workers.clone())
        );
        assert_eq!(
            compute_delta(&workers, &workers, "1.19.0", "v1.18.0"),
            Delta::Upgrade {
                from: "v1.18.0".to_string(),
                to: "v1.19.0".to_string()
            }
        );
        assert_eq!(compute_delta(&workers, &workers, "1.18.0", "v1.18.0"), Delta::None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Workers with unique names drawn from a small pool, so sets overlap
        fn worker_set() -> impl Strategy<Value = Vec<Host>> {
            prop::collection::hash_set("node[0-9]{1,2}", 0..16)
                .prop_map(|names| names.iter().map(|name| host(name)).collect())
        }

        proptest! {
            #[test]
            fn diff_of_a_set_with_itself_is_empty(workers in worker_set()) {
                prop_assert!(diff_workers(&workers, &workers).is_empty());
            }

            #[test]
            fn diff_is_symmetric(a in worker_set(), b in worker_set()) {
                let ab = diff_workers(&a, &b);
                let ba = diff_workers(&b, &a);
                prop_assert_eq!(&ab.to_add, &ba.to_remove);
                prop_assert_eq!(&ab.to_remove, &ba.to_add);
            }

            #[test]
            fn applying_the_diff_reaches_the_declared_set(declared in worker_set(), provisioned in worker_set()) {
                let diff = diff_workers(&declared, &provisioned);
                let mut result: HashSet<&str> = names(&provisioned).into_iter().collect();
                result.extend(names(&diff.to_add));
                for host in &diff.to_remove {
                    result.remove(host.name.as_str());
                }
                let expected: HashSet<&str> = names(&declared).into_iter().collect();
                prop_assert_eq!(result, expected);
            }
        }
    }
}
