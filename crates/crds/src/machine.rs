//! Machine definitions
//!
//! A machine is one pre-provisioned host. It is created and destroyed outside
//! the operator; the operator only reads it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One physical or virtual host of a bring-your-own-hosts cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Host name, unique within the cluster. Used as the installer node name.
    pub hostname: String,

    /// Address reachable from outside the cluster network (SSH hops)
    pub public_address: String,

    /// Address on the cluster network (installer control channel)
    pub private_address: String,

    /// Node labels applied once the machine joins the cluster
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Machine {
    /// Create a machine without labels
    pub fn new(
        hostname: impl Into<String>,
        public_address: impl Into<String>,
        private_address: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            public_address: public_address.into(),
            private_address: private_address.into(),
            labels: BTreeMap::new(),
        }
    }
}
