use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use orchestrator_core::models::{Job, JobSpec, JobStatus, SyncTarget};
use orchestrator_core::traits::JobRepository;
use orchestrator_core::{SchedulerError, SchedulerResult};

/// 内存作业仓储
///
/// 作业按ID有序保存，写入时校验版本号。
#[derive(Debug)]
pub struct InMemoryJobRepository {
    jobs: RwLock<BTreeMap<i64, Job>>,
    next_id: AtomicI64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    async fn filtered<F>(&self, predicate: F) -> Vec<Job>
    where
        F: Fn(&Job) -> bool,
    {
        let jobs = self.jobs.read().await;
        jobs.values().filter(|job| predicate(job)).cloned().collect()
    }
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, spec: JobSpec) -> SchedulerResult<Job> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Job::from_spec(id, spec, Utc::now());
        self.jobs.write().await.insert(id, job.clone());
        debug!("创建作业记录: {} ({})", id, job.kind);
        Ok(job)
    }

    async fn get(&self, id: i64) -> SchedulerResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> SchedulerResult<Job> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get(&job.id)
            .ok_or(SchedulerError::JobNotFound { id: job.id })?;

        if stored.version != job.version {
            return Err(SchedulerError::ConcurrentModification {
                job_id: job.id,
                expected: job.version,
                actual: stored.version,
            });
        }

        let mut updated = job.clone();
        updated.version += 1;
        jobs.insert(job.id, updated.clone());
        Ok(updated)
    }

    async fn list_by_status(&self, status: JobStatus) -> SchedulerResult<Vec<Job>> {
        Ok(self.filtered(|job| job.status == status).await)
    }

    async fn list_active_by_template(&self, template_id: i64) -> SchedulerResult<Vec<Job>> {
        Ok(self
            .filtered(|job| job.template_id == Some(template_id) && !job.is_terminal())
            .await)
    }

    async fn find_active_sync(&self, target: SyncTarget) -> SchedulerResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .find(|job| !job.is_terminal() && job.sync_target() == Some(target))
            .cloned())
    }

    async fn list_all(&self) -> SchedulerResult<Vec<Job>> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn restore(&self, restored: Vec<Job>) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        for job in restored {
            self.next_id.fetch_max(job.id + 1, Ordering::SeqCst);
            jobs.insert(job.id, job);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::models::{JobKind, JobSpec};

    fn sync_spec(target: SyncTarget) -> JobSpec {
        JobSpec::sync(target, "admin")
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let repo = InMemoryJobRepository::new();
        let first = repo.create(sync_spec(SyncTarget::Project(1))).await.unwrap();
        let second = repo.create(sync_spec(SyncTarget::Project(2))).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, JobStatus::New);
        assert_eq!(first.version, 0);
    }

    #[tokio::test]
    async fn test_update_rejects_stale_version() {
        let repo = InMemoryJobRepository::new();
        let job = repo.create(sync_spec(SyncTarget::Project(1))).await.unwrap();

        let mut first_writer = job.clone();
        first_writer.status = JobStatus::Pending;
        let saved = repo.update(&first_writer).await.unwrap();
        assert_eq!(saved.version, 1);

        let mut stale_writer = job.clone();
        stale_writer.status = JobStatus::Canceled;
        let err = repo.update(&stale_writer).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::ConcurrentModification {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        let stored = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_find_active_sync_ignores_terminal_jobs() {
        let repo = InMemoryJobRepository::new();
        let mut done = repo
            .create(sync_spec(SyncTarget::Inventory(4)))
            .await
            .unwrap();
        done.status = JobStatus::Successful;
        repo.update(&done).await.unwrap();
        assert!(repo
            .find_active_sync(SyncTarget::Inventory(4))
            .await
            .unwrap()
            .is_none());

        let active = repo
            .create(sync_spec(SyncTarget::Inventory(4)))
            .await
            .unwrap();
        let found = repo
            .find_active_sync(SyncTarget::Inventory(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, active.id);
        assert_eq!(found.kind, JobKind::InventoryUpdate);
    }

    #[tokio::test]
    async fn test_restore_advances_id_sequence() {
        let repo = InMemoryJobRepository::new();
        let mut job = Job::from_spec(41, sync_spec(SyncTarget::Project(1)), Utc::now());
        job.version = 5;
        repo.restore(vec![job]).await.unwrap();

        let next = repo.create(sync_spec(SyncTarget::Project(2))).await.unwrap();
        assert_eq!(next.id, 42);
        assert_eq!(repo.get(41).await.unwrap().unwrap().version, 5);
    }
}
