//! 作业生命周期
//!
//! 所有状态转换都经过这里：按作业加锁、校验状态机、带版本号保存、
//! 写审计记录、发布事件。离开 `running` 时自动释放占用的容量。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use orchestrator_core::models::{Job, JobSpec, JobStatus, StateTransition, StatusReason};
use orchestrator_core::traits::{AuditTrail, JobRepository};
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_domain::{EventPublisher, JobEvent, JobStateMachine, SchedulerEvent};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::capacity_registry::CapacityRegistry;

pub struct JobLifecycle {
    jobs: Arc<dyn JobRepository>,
    audit: Arc<dyn AuditTrail>,
    events: Arc<dyn EventPublisher>,
    capacity: Arc<CapacityRegistry>,
    metrics: MetricsCollector,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl JobLifecycle {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        audit: Arc<dyn AuditTrail>,
        events: Arc<dyn EventPublisher>,
        capacity: Arc<CapacityRegistry>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            jobs,
            audit,
            events,
            capacity,
            metrics,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobRepository> {
        &self.jobs
    }

    pub fn audit(&self) -> &Arc<dyn AuditTrail> {
        &self.audit
    }

    pub fn events(&self) -> &Arc<dyn EventPublisher> {
        &self.events
    }

    /// 获取作业的独占锁；读取、判断和写入都应在持锁期间完成
    pub async fn lock(&self, job_id: i64) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(job_id).or_default())
        };
        entry.lock_owned().await
    }

    pub async fn get(&self, job_id: i64) -> SchedulerResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::job_not_found(job_id))
    }

    /// 创建处于 `new` 状态的作业
    pub async fn create(&self, spec: JobSpec) -> SchedulerResult<Job> {
        let job = self.jobs.create(spec).await?;
        self.metrics.record_job_launched(job.kind);
        StructuredLogger::log_job_launched(job.id, job.kind, &job.name, &job.created_by);
        self.publish(JobEvent::created(job.id, job.kind, &job.name, &job.created_by).into())
            .await;
        Ok(job)
    }

    /// 加锁、读取并转换
    pub async fn transition(
        &self,
        job_id: i64,
        to: JobStatus,
        reason: Option<StatusReason>,
        actor: Option<&str>,
    ) -> SchedulerResult<Job> {
        let _guard = self.lock(job_id).await;
        let job = self.get(job_id).await?;
        self.transition_locked(job, to, reason, actor).await
    }

    /// 在调用方已持有作业锁时转换
    ///
    /// `job` 上尚未保存的字段修改会随转换一起写入。
    pub async fn transition_locked(
        &self,
        mut job: Job,
        to: JobStatus,
        reason: Option<StatusReason>,
        actor: Option<&str>,
    ) -> SchedulerResult<Job> {
        let was_running = job.status == JobStatus::Running;
        let transition = JobStateMachine::apply(&mut job, to, reason, actor, Utc::now())?;
        let saved = self.jobs.update(&job).await?;

        if was_running {
            if let Some(instance_id) = &saved.instance_id {
                self.release_capacity(saved.id, instance_id, saved.capacity_units)
                    .await;
            }
        }

        self.record(transition, &saved).await?;
        if saved.is_terminal() {
            self.locks.lock().await.remove(&saved.id);
        }
        Ok(saved)
    }

    async fn release_capacity(&self, job_id: i64, instance_id: &str, units: u32) {
        match self.capacity.release(instance_id, units).await {
            Ok(()) => debug!("作业 {} 释放实例 {} 上的 {} 容量", job_id, instance_id, units),
            Err(e) => warn!("作业 {} 释放容量失败: {}", job_id, e),
        }
    }

    async fn record(&self, transition: StateTransition, job: &Job) -> SchedulerResult<()> {
        let transition = self.audit.append(transition).await?;

        self.metrics.record_state_transition(transition.to);
        StructuredLogger::log_state_transition(&transition);
        if job.is_terminal() {
            let duration_ms = job.execution_duration_ms();
            if let Some(ms) = duration_ms {
                self.metrics
                    .record_job_duration(job.kind, ms as f64 / 1000.0);
            }
            StructuredLogger::log_job_finished(job.id, job.status, duration_ms);
        }

        self.publish(JobEvent::state_changed(&transition).into()).await;
        Ok(())
    }

    async fn publish(&self, event: SchedulerEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!("发布事件失败: {}", e);
        }
    }
}
