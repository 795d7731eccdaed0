//! Status conditions for CustomCluster
//!
//! One condition per lifecycle action. Each records the outcome of the most
//! recent attempt so an operator can see why an action failed without reading
//! job logs.

use crate::custom_cluster::CustomClusterStatus;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// Cluster provisioned by the init action
    Ready,
    ScaledUp,
    ScaledDown,
    Upgraded,
    Terminated,
    /// Admin kubeconfig fetched from the first master
    CredentialsRetrieved,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Whether the condition holds
    pub status: bool,

    /// Machine-readable reason in PascalCase
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ClusterCondition {
    pub fn new(type_: ConditionType, status: bool, reason: &str, message: Option<String>) -> Self {
        Self {
            type_,
            status,
            reason: reason.to_string(),
            message,
            last_transition_time: Some(Utc::now()),
        }
    }
}

impl CustomClusterStatus {
    /// Look up the condition of the given type
    pub fn condition(&self, type_: ConditionType) -> Option<&ClusterCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace the condition of the same type.
    ///
    /// The transition time is kept when the boolean state did not change.
    /// Returns true when anything observable changed.
    pub fn set_condition(&mut self, mut condition: ClusterCondition) -> bool {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status
                    && existing.reason == condition.reason
                    && existing.message == condition.message
                {
                    return false;
                }
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
                true
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_inserts_then_replaces() {
        let mut status = CustomClusterStatus::default();
        assert!(status.set_condition(ClusterCondition::new(ConditionType::ScaledUp, false, "JobFailed", None)));
        assert!(status.set_condition(ClusterCondition::new(ConditionType::ScaledUp, true, "JobSucceeded", None)));

        assert_eq!(status.conditions.len(), 1);
        let condition = status.condition(ConditionType::ScaledUp).unwrap();
        assert!(condition.status);
        assert_eq!(condition.reason, "JobSucceeded");
    }

    #[test]
    fn test_set_condition_unchanged_is_noop() {
        let mut status = CustomClusterStatus::default();
        status.set_condition(ClusterCondition::new(ConditionType::Ready, true, "Provisioned", None));
        let first = status.condition(ConditionType::Ready).unwrap().last_transition_time;

        assert!(!status.set_condition(ClusterCondition::new(ConditionType::Ready, true, "Provisioned", None)));
        assert_eq!(status.condition(ConditionType::Ready).unwrap().last_transition_time, first);
    }

    #[test]
    fn test_conditions_keyed_by_type() {
        let mut status = CustomClusterStatus::default();
        status.set_condition(ClusterCondition::new(ConditionType::Ready, true, "Provisioned", None));
        status.set_condition(ClusterCondition::new(ConditionType::Upgraded, false, "UnsupportedVersionSkew", None));

        assert_eq!(status.conditions.len(), 2);
        assert!(!status.condition(ConditionType::Upgraded).unwrap().status);
    }
}
