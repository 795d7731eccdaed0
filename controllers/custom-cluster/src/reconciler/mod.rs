//! Reconciliation logic for CustomCluster resources.
//!
//! A pass reads the committed artifacts and the job for the current action,
//! asks `state_machine::next_transition` what to do, performs that one
//! effect, and persists the resulting phase and conditions.
//!
//! - `artifacts`: committed/staged inventory and config ConfigMaps
//! - `descriptor`: validation and rendering from the CustomCluster spec
//! - `diff`: declared vs. provisioned workers and version
//! - `jobs`: installer job construction and the one-job-per-action lease
//! - `state_machine`: the pure phase transition function
//! - `credentials`: admin kubeconfig retrieval over SSH

pub mod artifacts;
pub mod conditions;
mod credentials;
pub mod descriptor;
pub mod diff;
pub mod jobs;
pub mod state_machine;

pub use credentials::ADMIN_KUBECONFIG_PATH;

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::store::ClusterStore;
use artifacts::{kubeconfig_secret_name, ArtifactKind, ArtifactRefs, Artifacts, ProvisionedState};
use crds::{CustomCluster, CustomClusterStatus, LifecyclePhase};
use diff::{compute_delta, diff_workers};
use jobs::{delete_cluster_jobs, ensure_job, find_job, job_state, release_job, JobLease, JobRequest};
use kubespray::{
    init_command, installer_image, parse_version, reset_command, scale_down_command, scale_up_command,
    upgrade_command, KubeVersion, INSTALLER_IMAGE,
};
use ssh_client::RemoteFileFetcherTrait;
use state_machine::{action_for_delta, next_transition, Effect, JobState, LifecycleAction, Observation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Finalizer guarding teardown of hosts and owned objects
pub const FINALIZER: &str = "kubeoperator.io/custom-cluster";

/// When the next pass should run after a successful one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextCheck {
    /// Phase moved without a job; continue promptly
    Soon,
    /// Waiting on an installer job
    JobInFlight,
    /// Nothing pending
    Idle,
}

impl NextCheck {
    pub fn requeue_after(&self) -> Duration {
        match self {
            NextCheck::Soon => Duration::from_secs(5),
            NextCheck::JobInFlight => Duration::from_secs(30),
            NextCheck::Idle => Duration::from_secs(300),
        }
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }
}

/// Reconciles CustomCluster resources.
pub struct Reconciler {
    pub(crate) store: Box<dyn ClusterStore>,
    pub(crate) fetcher: Box<dyn RemoteFileFetcherTrait>,
    pub(crate) metrics: Arc<Metrics>,
    /// Secret mounted into every installer job at `/auth`
    installer_ssh_secret: String,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("installer_ssh_secret", &self.installer_ssh_secret)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: impl ClusterStore + 'static,
        fetcher: impl RemoteFileFetcherTrait + 'static,
        metrics: Arc<Metrics>,
        installer_ssh_secret: String,
    ) -> Self {
        Self {
            store: Box::new(store),
            fetcher: Box::new(fetcher),
            metrics,
            installer_ssh_secret,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs one reconcile pass for a CustomCluster.
    pub async fn reconcile_custom_cluster(&self, cluster: &CustomCluster) -> Result<NextCheck, ControllerError> {
        let name = cluster
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("CustomCluster missing name".to_string()))?;
        let namespace = cluster.metadata.namespace.as_deref().unwrap_or("default");

        let original = cluster.status.clone().unwrap_or_default();
        let mut status = original.clone();
        let phase = status.phase;
        let deletion_requested = cluster.metadata.deletion_timestamp.is_some();

        let finalizers = cluster.metadata.finalizers.clone().unwrap_or_default();
        let has_finalizer = finalizers.iter().any(|f| f == FINALIZER);
        if deletion_requested && !has_finalizer {
            debug!("CustomCluster {}/{} is being deleted and holds no finalizer", namespace, name);
            return Ok(NextCheck::Idle);
        }
        if !has_finalizer {
            let mut finalizers = finalizers;
            finalizers.push(FINALIZER.to_string());
            self.store.set_finalizers(namespace, name, finalizers).await?;
            info!("Added finalizer to CustomCluster {}/{}", namespace, name);
        }

        if !deletion_requested && !phase.is_transient() {
            if let Err(e) = descriptor::validate(&cluster.spec) {
                warn!("CustomCluster {}/{} has an invalid descriptor: {}", namespace, name, e);
                status.set_condition(conditions::invalid_descriptor(&e.to_string()));
                self.persist_status(namespace, name, &original, &status).await?;
                return Err(e);
            }
            // Descriptor was fixed; the stale condition is replaced by the next job outcome
            status.conditions.retain(|c| c.reason != conditions::REASON_INVALID_DESCRIPTOR);
        }

        let artifacts = Artifacts::new(self.store.as_ref(), cluster, namespace, name);
        let (provisioned_state, provisioned) = if deletion_requested {
            (None, artifacts.has_committed_inventory().await?)
        } else {
            let established = !matches!(
                phase,
                LifecyclePhase::Pending | LifecyclePhase::Provisioning | LifecyclePhase::ProvisionFailed
            );
            let state = artifacts.load_provisioned(established).await?;
            let provisioned = state.is_some();
            (state, provisioned)
        };

        let delta = provisioned_state.as_ref().map(|state| {
            compute_delta(
                &descriptor::hosts(&cluster.spec.workers),
                &state.workers(),
                &cluster.spec.kube_version,
                &state.version.to_string(),
            )
        });

        let action = if deletion_requested && phase != LifecyclePhase::Deleting {
            None
        } else if phase == LifecyclePhase::Provisioned {
            delta.as_ref().and_then(action_for_delta)
        } else {
            LifecycleAction::for_phase(phase)
        };
        let job = match action {
            Some(action) => {
                let job = find_job(self.store.as_ref(), namespace, &JobLease::new(name, action)).await?;
                job_state(job.as_ref())
            }
            None => JobState::Absent,
        };

        let observation = Observation {
            phase,
            deletion_requested,
            provisioned,
            delta,
            job,
        };
        let transition = next_transition(&observation);
        debug!(
            "CustomCluster {}/{}: observed {:?}, effect {:?}",
            namespace, name, observation.job, transition.effect
        );

        if transition.effect == Effect::CleanUp {
            self.clean_up(&artifacts, namespace, name, cluster, &observation).await?;
            return Ok(NextCheck::Idle);
        }

        let mut next_check = self
            .apply_effect(&transition.effect, cluster, &artifacts, namespace, name, provisioned_state.as_ref(), &mut status)
            .await?;

        if transition.next != phase {
            info!(
                "CustomCluster {}/{} phase {} -> {}",
                namespace, name, phase, transition.next
            );
            if next_check == NextCheck::Idle {
                next_check = NextCheck::Soon;
            }
        }
        status.phase = transition.next;
        status.observed_generation = cluster.metadata.generation;

        if status.phase == LifecyclePhase::Provisioned {
            self.ensure_credentials(cluster, namespace, name, &mut status).await?;
        }

        self.persist_status(namespace, name, &original, &status).await?;
        Ok(next_check)
    }

    #[allow(clippy::too_many_arguments, reason = "one pass's context, borrowed")]
    async fn apply_effect(
        &self,
        effect: &Effect,
        cluster: &CustomCluster,
        artifacts: &Artifacts<'_>,
        namespace: &str,
        name: &str,
        provisioned: Option<&ProvisionedState>,
        status: &mut CustomClusterStatus,
    ) -> Result<NextCheck, ControllerError> {
        match effect {
            Effect::None | Effect::CleanUp => Ok(NextCheck::Idle),
            Effect::BeginDeletion => {
                // Running jobs are removed regardless of state; a leftover terminate job is kept
                let deleted =
                    delete_cluster_jobs(self.store.as_ref(), namespace, name, Some(LifecycleAction::Terminate)).await?;
                info!(
                    "Deleting CustomCluster {}/{}: removed {} management job(s)",
                    namespace, name, deleted
                );
                Ok(NextCheck::Soon)
            }
            Effect::StartJob(action) => {
                let request = self
                    .prepare_job(*action, cluster, artifacts, name, provisioned)
                    .await?;
                let (_, created) = ensure_job(self.store.as_ref(), namespace, cluster, &request).await?;
                if created {
                    self.metrics.jobs_created.with_label_values(&[action.as_str()]).inc();
                }
                status.set_condition(conditions::job_running(*action, &request.lease.job_name()));
                Ok(NextCheck::JobInFlight)
            }
            Effect::AwaitJob(action) => {
                let lease = JobLease::new(name, *action);
                status.set_condition(conditions::job_running(*action, &lease.job_name()));
                Ok(NextCheck::JobInFlight)
            }
            Effect::CommitJob(action) => {
                self.commit_job(*action, artifacts, namespace, name, status).await?;
                Ok(NextCheck::Soon)
            }
            Effect::RecordFailure(action, message) => {
                let lease = JobLease::new(name, *action);
                if status.set_condition(conditions::job_failed(*action, &lease.job_name(), message)) {
                    warn!(
                        "{} job for CustomCluster {}/{} failed: {}",
                        action, namespace, name, message
                    );
                    self.metrics
                        .job_outcomes
                        .with_label_values(&[action.as_str(), "failed"])
                        .inc();
                }
                Ok(NextCheck::Idle)
            }
            Effect::RejectUpgrade { from, to } => {
                if status.set_condition(conditions::unsupported_upgrade(from, to)) {
                    warn!(
                        "Refusing to upgrade CustomCluster {}/{} from {} to {}",
                        namespace, name, from, to
                    );
                }
                Ok(NextCheck::Idle)
            }
            Effect::Adopt => {
                if let Some(state) = provisioned {
                    let version = state.version.to_string();
                    info!(
                        "CustomCluster {}/{} already provisioned at {}; adopting recorded artifacts",
                        namespace, name, version
                    );
                    status.set_condition(conditions::adopted(&version));
                    status.provisioned_version = Some(version);
                }
                Ok(NextCheck::Soon)
            }
        }
    }

    /// Stages the artifacts `action` needs and describes its job.
    async fn prepare_job(
        &self,
        action: LifecycleAction,
        cluster: &CustomCluster,
        artifacts: &Artifacts<'_>,
        name: &str,
        provisioned: Option<&ProvisionedState>,
    ) -> Result<JobRequest, ControllerError> {
        let spec = &cluster.spec;
        let committed = artifacts.committed_refs();
        let require_provisioned = || {
            provisioned.ok_or_else(|| ControllerError::MissingArtifact(ArtifactKind::Inventory.committed_name(name)))
        };

        let (command, version, refs) = match action {
            LifecycleAction::Init => {
                let version = descriptor::declared_version(spec)?;
                let inventory = artifacts
                    .stage(action, ArtifactKind::Inventory, descriptor::render_inventory(spec)?)
                    .await?;
                let config = artifacts
                    .stage(
                        action,
                        ArtifactKind::Config,
                        descriptor::cluster_config(spec, version.clone()).render(),
                    )
                    .await?;
                (init_command(), version, ArtifactRefs { inventory, config })
            }
            LifecycleAction::ScaleUp => {
                let state = require_provisioned()?;
                let to_add = diff_workers(&descriptor::hosts(&spec.workers), &state.workers()).to_add;
                // Additive: hosts already recorded, including ones pending removal, stay put
                let mut inventory = state.inventory.clone();
                let added = inventory.add_workers(&to_add)?;
                info!("Scaling up {}: adding {}", name, added.join(","));
                let staged = artifacts
                    .stage(action, ArtifactKind::Inventory, inventory.render())
                    .await?;
                (
                    scale_up_command(),
                    state.version.clone(),
                    ArtifactRefs {
                        inventory: staged,
                        config: committed.config,
                    },
                )
            }
            LifecycleAction::ScaleDown => {
                let state = require_provisioned()?;
                let to_remove: Vec<String> = diff_workers(&descriptor::hosts(&spec.workers), &state.workers())
                    .to_remove
                    .into_iter()
                    .map(|host| host.name)
                    .collect();
                info!("Scaling down {}: removing {}", name, to_remove.join(","));
                // The job needs the nodes it removes, so it runs on the committed inventory;
                // the re-render from the descriptor is committed afterwards
                artifacts
                    .stage(action, ArtifactKind::Inventory, descriptor::render_inventory(spec)?)
                    .await?;
                (scale_down_command(&to_remove), state.version.clone(), committed)
            }
            LifecycleAction::Upgrade => {
                let target = descriptor::declared_version(spec)?;
                artifacts
                    .stage(
                        action,
                        ArtifactKind::Config,
                        descriptor::cluster_config(spec, target.clone()).render(),
                    )
                    .await?;
                (upgrade_command(&target), target, committed)
            }
            LifecycleAction::Terminate => {
                let version = self.recorded_version(artifacts, cluster).await;
                let image = version.as_ref().map_or(INSTALLER_IMAGE, installer_image);
                return Ok(JobRequest {
                    lease: JobLease::new(name, action),
                    command: reset_command(),
                    image: image.to_string(),
                    artifacts: committed,
                    ssh_secret: self.installer_ssh_secret.clone(),
                });
            }
        };

        Ok(JobRequest {
            lease: JobLease::new(name, action),
            command,
            image: installer_image(&version).to_string(),
            artifacts: refs,
            ssh_secret: self.installer_ssh_secret.clone(),
        })
    }

    /// Best-effort version for teardown: the recorded one, else the declared one.
    async fn recorded_version(&self, artifacts: &Artifacts<'_>, cluster: &CustomCluster) -> Option<KubeVersion> {
        let recorded = match artifacts.committed(ArtifactKind::Config).await {
            Ok(Some(text)) => parse_version(&text).ok(),
            _ => None,
        };
        recorded.or_else(|| descriptor::declared_version(&cluster.spec).ok())
    }

    async fn commit_job(
        &self,
        action: LifecycleAction,
        artifacts: &Artifacts<'_>,
        namespace: &str,
        name: &str,
        status: &mut CustomClusterStatus,
    ) -> Result<(), ControllerError> {
        let kinds: &[ArtifactKind] = match action {
            LifecycleAction::Init => &ArtifactKind::ALL,
            LifecycleAction::ScaleUp | LifecycleAction::ScaleDown => &[ArtifactKind::Inventory],
            LifecycleAction::Upgrade => &[ArtifactKind::Config],
            LifecycleAction::Terminate => &[],
        };
        for kind in kinds {
            if !artifacts.commit_staged(action, *kind).await? {
                warn!(
                    "No staged {} for {} of {}/{}; keeping the committed copy",
                    kind.committed_name(name),
                    action,
                    namespace,
                    name
                );
            }
        }

        let lease = JobLease::new(name, action);
        release_job(self.store.as_ref(), namespace, &lease).await?;
        info!("{} job for CustomCluster {}/{} succeeded", action, namespace, name);
        self.metrics
            .job_outcomes
            .with_label_values(&[action.as_str(), "succeeded"])
            .inc();
        status.set_condition(conditions::job_succeeded(action, &lease.job_name()));

        if let Some(state) = artifacts.load_provisioned(true).await? {
            status.provisioned_version = Some(state.version.to_string());
        }
        Ok(())
    }

    /// Removes everything the cluster owns, then releases the finalizer.
    async fn clean_up(
        &self,
        artifacts: &Artifacts<'_>,
        namespace: &str,
        name: &str,
        cluster: &CustomCluster,
        observation: &Observation,
    ) -> Result<(), ControllerError> {
        if observation.job == JobState::Succeeded {
            self.metrics
                .job_outcomes
                .with_label_values(&[LifecycleAction::Terminate.as_str(), "succeeded"])
                .inc();
        }

        delete_cluster_jobs(self.store.as_ref(), namespace, name, None).await?;
        artifacts.delete_all().await?;
        self.store
            .delete_secret(namespace, &kubeconfig_secret_name(name))
            .await?;

        let finalizers: Vec<String> = cluster
            .metadata
            .finalizers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != FINALIZER)
            .collect();
        self.store.set_finalizers(namespace, name, finalizers).await?;
        info!("CustomCluster {}/{} cleaned up; finalizer released", namespace, name);
        Ok(())
    }

    async fn persist_status(
        &self,
        namespace: &str,
        name: &str,
        original: &CustomClusterStatus,
        status: &CustomClusterStatus,
    ) -> Result<(), ControllerError> {
        if status == original {
            debug!("Status of CustomCluster {}/{} unchanged", namespace, name);
            return Ok(());
        }
        self.store.patch_status(namespace, name, status).await
    }

    /// Delay before retrying a failed pass, advancing the per-resource backoff.
    ///
    /// Errors the user has to fix wait the maximum delay.
    pub(crate) fn error_backoff(&self, resource_key: &str, error: &ControllerError) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                state.error_count += 1;
                let delay = if error.is_input_error() {
                    state.backoff.max_backoff()
                } else {
                    state.backoff.next_backoff()
                };
                debug!(
                    "Backoff for {} after {} error(s): {:?}",
                    resource_key, state.error_count, delay
                );
                delay
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                Duration::from_secs(60)
            }
        }
    }

    /// Reset error count and backoff after a successful pass
    pub(crate) fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
