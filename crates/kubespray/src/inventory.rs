//! Ansible host inventory codec
//!
//! The inventory is the installer's `hosts.ini`. It is also the operator's
//! record of which nodes have been applied, so [`Inventory::parse`] must
//! recover exactly what [`Inventory::render`] wrote for host identity and
//! addresses.
//!
//! Rendered layout:
//!
//! ```text
//! [all]
//! master1 ansible_host=1.1.1.1 ip=10.0.0.1 access_ip=10.0.0.1
//! node1 ansible_host=1.1.1.2 ip=10.0.0.2 access_ip=10.0.0.2
//!
//! [kube-master]
//! master1
//!
//! [etcd]
//! master1
//!
//! [kube-node]
//! node1
//!
//! [k8s-cluster:children]
//! kube-master
//! kube-node
//! ```

use crate::error::KubesprayError;
use std::collections::HashSet;
use std::fmt::Write;

/// Every host with its connection variables
pub const ALL_SECTION: &str = "all";

/// Control-plane host names
pub const MASTER_SECTION: &str = "kube-master";

/// etcd members, always the control-plane hosts
pub const ETCD_SECTION: &str = "etcd";

/// Worker host names
pub const WORKER_SECTION: &str = "kube-node";

/// Group of groups the installer targets
pub const CLUSTER_CHILDREN_SECTION: &str = "k8s-cluster:children";

/// Longest host name accepted, the DNS subdomain limit
pub const MAX_HOST_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

const PUBLIC_ADDRESS_VAR: &str = "ansible_host";
const PRIVATE_ADDRESS_VAR: &str = "ip";
const ACCESS_ADDRESS_VAR: &str = "access_ip";

/// One inventory host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub name: String,
    pub public_address: String,
    pub private_address: String,
}

impl Host {
    pub fn new(
        name: impl Into<String>,
        public_address: impl Into<String>,
        private_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            public_address: public_address.into(),
            private_address: private_address.into(),
        }
    }

    /// Checks the host survives a render/parse round trip.
    ///
    /// The name must be a DNS subdomain (see [`validate_host_name`]) and both
    /// addresses must be single non-empty tokens.
    pub fn validate(&self) -> Result<(), KubesprayError> {
        validate_host_name(&self.name)?;
        for (var, value) in [
            (PUBLIC_ADDRESS_VAR, &self.public_address),
            (PRIVATE_ADDRESS_VAR, &self.private_address),
        ] {
            if value.is_empty() || value.contains(char::is_whitespace) {
                return Err(KubesprayError::InvalidHost {
                    name: self.name.clone(),
                    reason: format!("{} '{}' must be a single non-empty token", var, value),
                });
            }
        }
        Ok(())
    }

    fn render_line(&self) -> String {
        format!(
            "{} {}={} {}={} {}={}",
            self.name,
            PUBLIC_ADDRESS_VAR,
            self.public_address,
            PRIVATE_ADDRESS_VAR,
            self.private_address,
            ACCESS_ADDRESS_VAR,
            self.private_address,
        )
    }

    fn parse_line(line: &str, line_no: usize) -> Result<Self, KubesprayError> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or_else(|| KubesprayError::InventoryParse {
            line: line_no,
            reason: "empty host line".to_string(),
        })?;

        let mut public_address = None;
        let mut private_address = None;
        for token in tokens {
            let Some((key, value)) = token.split_once('=') else {
                return Err(KubesprayError::InventoryParse {
                    line: line_no,
                    reason: format!("host variable '{}' is not key=value", token),
                });
            };
            match key {
                PUBLIC_ADDRESS_VAR => public_address = Some(value.to_string()),
                PRIVATE_ADDRESS_VAR => private_address = Some(value.to_string()),
                _ => {}
            }
        }

        let missing = |var: &str| KubesprayError::InventoryParse {
            line: line_no,
            reason: format!("host '{}' has no {} variable", name, var),
        };
        Ok(Self {
            name: name.to_string(),
            public_address: public_address.ok_or_else(|| missing(PUBLIC_ADDRESS_VAR))?,
            private_address: private_address.ok_or_else(|| missing(PRIVATE_ADDRESS_VAR))?,
        })
    }
}

/// Typed form of the host inventory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inventory {
    hosts: Vec<Host>,
    masters: Vec<String>,
    workers: Vec<String>,
}

impl Inventory {
    /// Build an inventory from ordered master and worker lists.
    ///
    /// A host listed twice keeps its first definition. Fails on any host
    /// [`Host::validate`] rejects.
    pub fn new(masters: &[Host], workers: &[Host]) -> Result<Self, KubesprayError> {
        masters.iter().try_for_each(Host::validate)?;
        let mut inventory = Self::default();
        for host in masters {
            if inventory.insert_host(host) {
                inventory.masters.push(host.name.clone());
            }
        }
        inventory.add_workers(workers)?;
        Ok(inventory)
    }

    /// Append workers not yet present, keeping existing entries untouched.
    ///
    /// Returns the names actually added. Nothing is added if any worker is
    /// invalid.
    pub fn add_workers(&mut self, workers: &[Host]) -> Result<Vec<String>, KubesprayError> {
        workers.iter().try_for_each(Host::validate)?;
        let mut added = Vec::new();
        for host in workers {
            if self.insert_host(host) {
                self.workers.push(host.name.clone());
                added.push(host.name.clone());
            }
        }
        Ok(added)
    }

    fn insert_host(&mut self, host: &Host) -> bool {
        if self.hosts.iter().any(|h| h.name == host.name) {
            return false;
        }
        self.hosts.push(host.clone());
        true
    }

    fn resolve(&self, names: &[String]) -> Vec<Host> {
        names
            .iter()
            .filter_map(|name| self.hosts.iter().find(|h| &h.name == name).cloned())
            .collect()
    }

    /// Worker hosts in inventory order
    pub fn workers(&self) -> Vec<Host> {
        self.resolve(&self.workers)
    }

    /// Control-plane hosts in inventory order
    pub fn masters(&self) -> Vec<Host> {
        self.resolve(&self.masters)
    }

    /// Render the INI text consumed by the installer
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "[{}]", ALL_SECTION);
        for host in &self.hosts {
            let _ = writeln!(out, "{}", host.render_line());
        }
        for (section, names) in [
            (MASTER_SECTION, &self.masters),
            (ETCD_SECTION, &self.masters),
            (WORKER_SECTION, &self.workers),
        ] {
            let _ = writeln!(out, "\n[{}]", section);
            for name in names {
                let _ = writeln!(out, "{}", name);
            }
        }
        let _ = writeln!(out, "\n[{}]", CLUSTER_CHILDREN_SECTION);
        let _ = writeln!(out, "{}", MASTER_SECTION);
        let _ = writeln!(out, "{}", WORKER_SECTION);
        out
    }

    /// Parse inventory text previously produced by [`Inventory::render`].
    ///
    /// Blank lines and `#`/`;` comments are skipped and unknown sections are
    /// ignored. Host lines outside any section, duplicate hosts, and group
    /// members missing from `[all]` are errors. Host names are taken as
    /// written and not re-validated.
    pub fn parse(text: &str) -> Result<Self, KubesprayError> {
        let mut inventory = Self::default();
        let mut seen_sections = HashSet::new();
        let mut section: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| KubesprayError::InventoryParse {
                    line: line_no,
                    reason: format!("unterminated section header '{}'", line),
                })?;
                seen_sections.insert(name.to_string());
                section = Some(name.to_string());
                continue;
            }

            match section.as_deref() {
                None => {
                    return Err(KubesprayError::InventoryParse {
                        line: line_no,
                        reason: "host line outside of any section".to_string(),
                    });
                }
                Some(ALL_SECTION) => {
                    let host = Host::parse_line(line, line_no)?;
                    if !inventory.insert_host(&host) {
                        return Err(KubesprayError::InventoryParse {
                            line: line_no,
                            reason: format!("duplicate host '{}'", host.name),
                        });
                    }
                }
                Some(MASTER_SECTION) => inventory.masters.push(group_member(line)),
                Some(WORKER_SECTION) => inventory.workers.push(group_member(line)),
                Some(_) => {}
            }
        }

        for required in [ALL_SECTION, MASTER_SECTION, WORKER_SECTION] {
            if !seen_sections.contains(required) {
                return Err(KubesprayError::MissingSection(required.to_string()));
            }
        }
        for name in inventory.masters.iter().chain(inventory.workers.iter()) {
            if !inventory.hosts.iter().any(|h| &h.name == name) {
                return Err(KubesprayError::InventoryParse {
                    line: 0,
                    reason: format!("group member '{}' is not defined in [{}]", name, ALL_SECTION),
                });
            }
        }

        Ok(inventory)
    }
}

/// Checks `name` is an RFC 1123 DNS subdomain, the form Kubernetes requires
/// of node names.
///
/// Such a name is one token of lowercase alphanumerics, `-` and `.`, so the
/// parser can never mistake it for a comment or a section header.
pub fn validate_host_name(name: &str) -> Result<(), KubesprayError> {
    let invalid = |reason: &str| KubesprayError::InvalidHost {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("host name is empty"));
    }
    if name.len() > MAX_HOST_NAME_LEN {
        return Err(invalid("host name is longer than 253 characters"));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(invalid("each dot-separated label must be 1 to 63 characters"));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(invalid("only lowercase alphanumerics, '-' and '.' are allowed"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels must start and end with an alphanumeric"));
        }
    }
    Ok(())
}

fn group_member(line: &str) -> String {
    line.split_whitespace().next().unwrap_or(line).to_string()
}

/// Recover the worker hosts recorded in inventory text
pub fn parse_workers(text: &str) -> Result<Vec<Host>, KubesprayError> {
    Inventory::parse(text).map(|inventory| inventory.workers())
}
