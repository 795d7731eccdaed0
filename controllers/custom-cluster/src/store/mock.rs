//! In-memory `ClusterStore` for reconciler tests.

use super::ClusterStore;
use crate::error::ControllerError;
use async_trait::async_trait;
use crds::CustomClusterStatus;
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct MockState {
    config_maps: BTreeMap<Key, ConfigMap>,
    jobs: BTreeMap<Key, Job>,
    secrets: BTreeMap<Key, Secret>,
    statuses: BTreeMap<Key, CustomClusterStatus>,
    finalizers: BTreeMap<Key, Vec<String>>,
    created_jobs: Vec<String>,
    conflict_on_create: bool,
}

/// Shared in-memory store; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_map_data(&self, namespace: &str, name: &str, data_key: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .config_maps
            .get(&key(namespace, name))
            .and_then(|cm| cm.data.as_ref())
            .and_then(|data| data.get(data_key).cloned())
    }

    pub fn has_config_map(&self, namespace: &str, name: &str) -> bool {
        self.state.lock().unwrap().config_maps.contains_key(&key(namespace, name))
    }

    pub fn insert_config_map(&self, namespace: &str, config_map: ConfigMap) {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .config_maps
            .insert(key(namespace, &name), config_map);
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(&key(namespace, name)).cloned()
    }

    pub fn job_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Names of every job ever created, in creation order.
    pub fn created_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().created_jobs.clone()
    }

    pub fn insert_job(&self, namespace: &str, job: Job) {
        let name = job.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().jobs.insert(key(namespace, &name), job);
    }

    /// Marks a job as finished, the way the job controller reports it.
    pub fn finish_job(&self, namespace: &str, name: &str, succeeded: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(&key(namespace, name)) {
            let (type_, message) = if succeeded {
                ("Complete", None)
            } else {
                ("Failed", Some("BackoffLimitExceeded: ansible-playbook exited 2".to_string()))
            };
            job.status = Some(JobStatus {
                succeeded: succeeded.then_some(1),
                failed: (!succeeded).then_some(1),
                conditions: Some(vec![JobCondition {
                    type_: type_.to_string(),
                    status: "True".to_string(),
                    message,
                    ..Default::default()
                }]),
                ..Default::default()
            });
        }
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state.lock().unwrap().secrets.get(&key(namespace, name)).cloned()
    }

    pub fn insert_secret(&self, namespace: &str, secret: Secret) {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().secrets.insert(key(namespace, &name), secret);
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<CustomClusterStatus> {
        self.state.lock().unwrap().statuses.get(&key(namespace, name)).cloned()
    }

    pub fn finalizers(&self, namespace: &str, name: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().finalizers.get(&key(namespace, name)).cloned()
    }

    /// Makes the next `create_job` lose a race with another writer.
    pub fn conflict_on_next_create(&self) {
        self.state.lock().unwrap().conflict_on_create = true;
    }
}

fn matches_selector(job: &Job, selector: &str) -> bool {
    let labels = job.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ClusterStore for MockStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ControllerError> {
        Ok(self.state.lock().unwrap().config_maps.get(&key(namespace, name)).cloned())
    }

    async fn apply_config_map(&self, namespace: &str, config_map: ConfigMap) -> Result<(), ControllerError> {
        self.insert_config_map(namespace, config_map);
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.state.lock().unwrap().config_maps.remove(&key(namespace, name));
        Ok(())
    }

    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> Result<Vec<Job>, ControllerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .filter(|((ns, _), job)| ns == namespace && matches_selector(job, label_selector))
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn create_job(&self, namespace: &str, job: Job) -> Result<Job, ControllerError> {
        let name = job.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        if state.conflict_on_create {
            state.conflict_on_create = false;
            return Err(ControllerError::Conflict(format!("job {} was created concurrently", name)));
        }
        if state.jobs.contains_key(&key(namespace, &name)) {
            return Err(ControllerError::Conflict(format!("job {} already exists", name)));
        }
        state.jobs.insert(key(namespace, &name), job.clone());
        state.created_jobs.push(name);
        Ok(job)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.state.lock().unwrap().jobs.remove(&key(namespace, name));
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ControllerError> {
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<(), ControllerError> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        if state.secrets.contains_key(&key(namespace, &name)) {
            return Err(ControllerError::Conflict(format!("secret {} already exists", name)));
        }
        state.secrets.insert(key(namespace, &name), secret);
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.state.lock().unwrap().secrets.remove(&key(namespace, name));
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CustomClusterStatus,
    ) -> Result<(), ControllerError> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(key(namespace, name), status.clone());
        Ok(())
    }

    async fn set_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), ControllerError> {
        self.state
            .lock()
            .unwrap()
            .finalizers
            .insert(key(namespace, name), finalizers);
        Ok(())
    }
}
