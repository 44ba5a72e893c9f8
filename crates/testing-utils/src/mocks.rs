//! Mock collaborators
//!
//! Test doubles for the execution launcher and the credential resolver.
//! They record every call so tests can assert on what the core asked for.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orchestrator_core::models::{LaunchRequest, SecretHandle};
use orchestrator_core::traits::{CredentialResolver, ExecutionLauncher};
use orchestrator_core::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
struct LauncherState {
    launched: Vec<LaunchRequest>,
    canceled: Vec<(i64, String)>,
    alive: HashSet<i64>,
    fail_launches: bool,
}

/// Mock implementation of ExecutionLauncher
///
/// Launched jobs stay alive until `finish` or `cancel` is called.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent launch fails with a launch error
    pub fn failing() -> Self {
        let launcher = Self::new();
        launcher.set_failing(true);
        launcher
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().fail_launches = failing;
    }

    /// Mark a job as alive without launching it, as if it survived a restart
    pub fn mark_alive(&self, job_id: i64) {
        self.state.lock().unwrap().alive.insert(job_id);
    }

    pub fn finish(&self, job_id: i64) {
        self.state.lock().unwrap().alive.remove(&job_id);
    }

    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn launched_ids(&self) -> Vec<i64> {
        self.launched().iter().map(|r| r.job_id).collect()
    }

    pub fn canceled(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().canceled.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().unwrap().launched.len()
    }
}

#[async_trait]
impl ExecutionLauncher for MockLauncher {
    async fn launch(&self, request: LaunchRequest) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_launches {
            return Err(SchedulerError::Launch(format!(
                "mock launcher refused job {}",
                request.job_id
            )));
        }
        state.alive.insert(request.job_id);
        state.launched.push(request);
        Ok(())
    }

    async fn cancel(&self, job_id: i64, instance_id: &str) -> SchedulerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(&job_id);
        state.canceled.push((job_id, instance_id.to_string()));
        Ok(())
    }

    async fn is_alive(&self, job_id: i64) -> SchedulerResult<bool> {
        Ok(self.state.lock().unwrap().alive.contains(&job_id))
    }
}

/// Mock implementation of CredentialResolver
///
/// Resolves every id unless it was registered as missing.
#[derive(Debug, Clone, Default)]
pub struct MockCredentialResolver {
    missing: Arc<Mutex<HashSet<i64>>>,
    resolved: Arc<Mutex<HashMap<i64, usize>>>,
}

impl MockCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing(ids: &[i64]) -> Self {
        let resolver = Self::new();
        resolver.missing.lock().unwrap().extend(ids.iter().copied());
        resolver
    }

    /// Number of successful resolutions for a credential
    pub fn resolve_count(&self, credential_id: i64) -> usize {
        self.resolved
            .lock()
            .unwrap()
            .get(&credential_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CredentialResolver for MockCredentialResolver {
    async fn resolve(&self, credential_id: i64) -> SchedulerResult<SecretHandle> {
        if self.missing.lock().unwrap().contains(&credential_id) {
            return Err(SchedulerError::Credential(format!(
                "credential {credential_id} not found"
            )));
        }
        *self
            .resolved
            .lock()
            .unwrap()
            .entry(credential_id)
            .or_insert(0) += 1;
        Ok(SecretHandle::new(format!("vault://credentials/{credential_id}")))
    }
}
