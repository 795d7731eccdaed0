//! Installer job construction and lookup.
//!
//! One job per (cluster, action). The `JobLease` names that pair and is the
//! only way to find or create the job, so two jobs for the same action can
//! never coexist: the name is deterministic and the lookup is by label.

use super::artifacts::{owned_metadata, ArtifactRefs, ACTION_LABEL, CLUSTER_LABEL, CONFIG_KEY, INVENTORY_KEY};
use super::state_machine::{JobState, LifecycleAction};
use crate::error::ControllerError;
use crate::store::ClusterStore;
use crds::CustomCluster;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, KeyToPath, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kubespray::{CONFIG_FILE, HOST_FILE, INSTALLER_WORKDIR, SSH_KEY_DIR};
use tracing::{debug, info, warn};

const INVENTORY_VOLUME: &str = "inventory";
const CONFIG_VOLUME: &str = "cluster-config";
const SSH_KEY_VOLUME: &str = "ssh-key";
/// Private key must not be group/world readable for ssh to accept it
const SSH_KEY_MODE: i32 = 0o400;

/// Exclusive claim on the job slot for one action of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobLease {
    cluster: String,
    action: LifecycleAction,
}

impl JobLease {
    pub fn new(cluster: impl Into<String>, action: LifecycleAction) -> Self {
        Self {
            cluster: cluster.into(),
            action,
        }
    }

    pub fn action(&self) -> LifecycleAction {
        self.action
    }

    pub fn job_name(&self) -> String {
        format!("{}-{}", self.cluster, self.action.as_str())
    }

    pub fn label_selector(&self) -> String {
        format!(
            "{}={},{}={}",
            CLUSTER_LABEL,
            self.cluster,
            ACTION_LABEL,
            self.action.as_str()
        )
    }
}

/// Everything needed to create the job for a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub lease: JobLease,
    pub command: String,
    pub image: String,
    pub artifacts: ArtifactRefs,
    pub ssh_secret: String,
}

fn mount_path(relative: &str) -> String {
    format!("{}/inventory/{}", INSTALLER_WORKDIR, relative)
}

/// Builds the installer job.
///
/// The job:
/// - runs the command through `sh -c` in `/kubespray`
/// - mounts the inventory and config ConfigMaps read-only at the paths the
///   command refers to
/// - mounts the installer SSH secret read-only at `/auth`
/// - never retries (`backoffLimit: 0`, `restartPolicy: Never`)
/// - is owned by the cluster so it is garbage collected with it
pub fn build_job(cluster: &CustomCluster, request: &JobRequest) -> Job {
    let action = request.lease.action().as_str();
    let metadata = owned_metadata(cluster, request.lease.job_name(), (ACTION_LABEL, action));

    let container = Container {
        name: "kubespray".to_string(),
        image: Some(request.image.clone()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), request.command.clone()]),
        working_dir: Some(INSTALLER_WORKDIR.to_string()),
        volume_mounts: Some(vec![
            VolumeMount {
                name: INVENTORY_VOLUME.to_string(),
                mount_path: mount_path(HOST_FILE),
                sub_path: Some(INVENTORY_KEY.to_string()),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: mount_path(CONFIG_FILE),
                sub_path: Some(CONFIG_KEY.to_string()),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: SSH_KEY_VOLUME.to_string(),
                mount_path: SSH_KEY_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let volumes = vec![
        Volume {
            name: INVENTORY_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: request.artifacts.inventory.clone(),
                items: Some(vec![KeyToPath {
                    key: INVENTORY_KEY.to_string(),
                    path: INVENTORY_KEY.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: request.artifacts.config.clone(),
                items: Some(vec![KeyToPath {
                    key: CONFIG_KEY.to_string(),
                    path: CONFIG_KEY.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: SSH_KEY_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(request.ssh_secret.clone()),
                default_mode: Some(SSH_KEY_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    Job {
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: metadata.labels.clone(),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        metadata,
        ..Default::default()
    }
}

fn has_condition(job: &Job, type_: &str) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| conditions.iter().any(|c| c.type_ == type_ && c.status == "True"))
}

/// Check if a Job has completed successfully
pub fn is_job_complete(job: &Job) -> bool {
    has_condition(job, "Complete") || job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0) > 0
}

/// Check if a Job has failed
pub fn is_job_failed(job: &Job) -> bool {
    has_condition(job, "Failed") || job.status.as_ref().and_then(|s| s.failed).unwrap_or(0) > 0
}

/// Extract failure message from a failed Job
pub fn job_failure_message(job: &Job) -> String {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.type_ == "Failed" && c.status == "True")
                .and_then(|c| c.message.clone().or_else(|| c.reason.clone()))
        })
        .unwrap_or_else(|| "installer job failed".to_string())
}

/// Reduces a job (or its absence) to the state the phase machine consumes.
pub fn job_state(job: Option<&Job>) -> JobState {
    match job {
        None => JobState::Absent,
        Some(job) if is_job_failed(job) => JobState::Failed(job_failure_message(job)),
        Some(job) if is_job_complete(job) => JobState::Succeeded,
        Some(_) => JobState::Running,
    }
}

/// Finds the job holding `lease`, whatever its state.
pub async fn find_job(
    store: &dyn ClusterStore,
    namespace: &str,
    lease: &JobLease,
) -> Result<Option<Job>, ControllerError> {
    let jobs = store.list_jobs(namespace, &lease.label_selector()).await?;
    if jobs.len() > 1 {
        warn!(
            "Found {} jobs for {} in {}; using the first",
            jobs.len(),
            lease.job_name(),
            namespace
        );
    }
    Ok(jobs.into_iter().next())
}

/// Returns the existing job for the lease, or creates it.
///
/// An existing job is returned unchanged even when it is terminal; callers
/// delete consumed jobs themselves.
pub async fn ensure_job(
    store: &dyn ClusterStore,
    namespace: &str,
    cluster: &CustomCluster,
    request: &JobRequest,
) -> Result<(Job, bool), ControllerError> {
    if let Some(job) = find_job(store, namespace, &request.lease).await? {
        debug!("Job {}/{} already exists", namespace, request.lease.job_name());
        return Ok((job, false));
    }

    match store.create_job(namespace, build_job(cluster, request)).await {
        Ok(job) => {
            info!(
                "Created {} job {}/{}",
                request.lease.action(),
                namespace,
                request.lease.job_name()
            );
            Ok((job, true))
        }
        Err(ControllerError::Conflict(reason)) => {
            // Lost the race; whoever won holds the lease
            match find_job(store, namespace, &request.lease).await? {
                Some(job) => Ok((job, false)),
                None => Err(ControllerError::Conflict(reason)),
            }
        }
        Err(e) => Err(e),
    }
}

/// Deletes the job holding `lease`, if any.
pub async fn release_job(store: &dyn ClusterStore, namespace: &str, lease: &JobLease) -> Result<(), ControllerError> {
    store.delete_job(namespace, &lease.job_name()).await
}

/// Deletes every job of the cluster except `keep`, regardless of state.
pub async fn delete_cluster_jobs(
    store: &dyn ClusterStore,
    namespace: &str,
    cluster: &str,
    keep: Option<LifecycleAction>,
) -> Result<usize, ControllerError> {
    let selector = format!("{}={}", CLUSTER_LABEL, cluster);
    let mut deleted = 0;
    for job in store.list_jobs(namespace, &selector).await? {
        let action = job
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(ACTION_LABEL))
            .cloned()
            .unwrap_or_default();
        if keep.is_some_and(|keep| keep.as_str() == action) {
            continue;
        }
        if let Some(name) = job.metadata.name.as_deref() {
            store.delete_job(namespace, name).await?;
            deleted += 1;
        }
    }
    Ok(deleted)
}
