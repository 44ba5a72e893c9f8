use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use orchestrator_core::models::{WorkflowJob, WorkflowJobTemplate};
use orchestrator_core::traits::WorkflowRepository;
use orchestrator_core::{SchedulerError, SchedulerResult};

#[derive(Debug)]
pub struct InMemoryWorkflowRepository {
    templates: RwLock<HashMap<i64, WorkflowJobTemplate>>,
    jobs: RwLock<BTreeMap<i64, WorkflowJob>>,
    next_id: AtomicI64,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
            jobs: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get_template(&self, id: i64) -> SchedulerResult<Option<WorkflowJobTemplate>> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn save_template(&self, template: WorkflowJobTemplate) -> SchedulerResult<()> {
        self.templates.write().await.insert(template.id, template);
        Ok(())
    }

    async fn create_job(&self, mut workflow_job: WorkflowJob) -> SchedulerResult<WorkflowJob> {
        workflow_job.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.jobs
            .write()
            .await
            .insert(workflow_job.id, workflow_job.clone());
        Ok(workflow_job)
    }

    async fn get_job(&self, id: i64) -> SchedulerResult<Option<WorkflowJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update_job(&self, workflow_job: &WorkflowJob) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&workflow_job.id) {
            return Err(SchedulerError::WorkflowJobNotFound {
                id: workflow_job.id,
            });
        }
        jobs.insert(workflow_job.id, workflow_job.clone());
        Ok(())
    }

    async fn list_active_jobs(&self) -> SchedulerResult<Vec<WorkflowJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|w| !w.is_terminal()).cloned().collect())
    }

    async fn list_all_jobs(&self) -> SchedulerResult<Vec<WorkflowJob>> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn restore_jobs(&self, workflow_jobs: Vec<WorkflowJob>) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        for workflow_job in workflow_jobs {
            self.next_id
                .fetch_max(workflow_job.id + 1, Ordering::SeqCst);
            jobs.insert(workflow_job.id, workflow_job);
        }
        Ok(())
    }
}
