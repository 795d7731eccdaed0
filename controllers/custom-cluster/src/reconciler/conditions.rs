//! Condition reasons and builders for CustomCluster status.

use super::state_machine::LifecycleAction;
use crds::{ClusterCondition, ConditionType};

pub const REASON_JOB_RUNNING: &str = "JobRunning";
pub const REASON_JOB_SUCCEEDED: &str = "JobSucceeded";
pub const REASON_JOB_FAILED: &str = "JobFailed";
pub const REASON_INVALID_DESCRIPTOR: &str = "InvalidDescriptor";
pub const REASON_UNSUPPORTED_VERSION_SKEW: &str = "UnsupportedVersionSkew";
pub const REASON_ADOPTED: &str = "AdoptedExistingArtifacts";
pub const REASON_RETRIEVED: &str = "Retrieved";
pub const REASON_RETRIEVAL_FAILED: &str = "RetrievalFailed";

pub fn job_running(action: LifecycleAction, job_name: &str) -> ClusterCondition {
    ClusterCondition::new(
        action.condition_type(),
        false,
        REASON_JOB_RUNNING,
        Some(format!("job {} is running", job_name)),
    )
}

pub fn job_succeeded(action: LifecycleAction, job_name: &str) -> ClusterCondition {
    ClusterCondition::new(
        action.condition_type(),
        true,
        REASON_JOB_SUCCEEDED,
        Some(format!("job {} succeeded", job_name)),
    )
}

/// Failure plus what the operator has to do to retry.
pub fn job_failed(action: LifecycleAction, job_name: &str, message: &str) -> ClusterCondition {
    ClusterCondition::new(
        action.condition_type(),
        false,
        REASON_JOB_FAILED,
        Some(format!(
            "job {} failed: {}; delete the job to retry",
            job_name, message
        )),
    )
}

pub fn invalid_descriptor(message: &str) -> ClusterCondition {
    ClusterCondition::new(
        ConditionType::Ready,
        false,
        REASON_INVALID_DESCRIPTOR,
        Some(message.to_string()),
    )
}

pub fn unsupported_upgrade(from: &str, to: &str) -> ClusterCondition {
    ClusterCondition::new(
        ConditionType::Upgraded,
        false,
        REASON_UNSUPPORTED_VERSION_SKEW,
        Some(format!(
            "upgrade from {} to {} skips a minor version; upgrade one minor version at a time",
            from, to
        )),
    )
}

pub fn adopted(version: &str) -> ClusterCondition {
    ClusterCondition::new(
        ConditionType::Ready,
        true,
        REASON_ADOPTED,
        Some(format!("recorded artifacts show {} already provisioned", version)),
    )
}

pub fn credentials_retrieved(secret: &str) -> ClusterCondition {
    ClusterCondition::new(
        ConditionType::CredentialsRetrieved,
        true,
        REASON_RETRIEVED,
        Some(format!("stored in secret {}", secret)),
    )
}

pub fn credentials_failed(message: &str) -> ClusterCondition {
    ClusterCondition::new(
        ConditionType::CredentialsRetrieved,
        false,
        REASON_RETRIEVAL_FAILED,
        Some(message.to_string()),
    )
}
