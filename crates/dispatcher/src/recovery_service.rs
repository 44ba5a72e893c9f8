use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use orchestrator_core::models::{JobStatus, StateSnapshot, StatusReason};
use orchestrator_core::traits::{AuditTrail, ExecutionLauncher, JobRepository, WorkflowRepository};
use orchestrator_core::SchedulerResult;
use orchestrator_infrastructure::StructuredLogger;

use crate::capacity_registry::{CapacityRegistry, Reservation};
use crate::lifecycle::JobLifecycle;

/// 恢复报告
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// 执行层确认仍在运行、已重新占用容量的作业
    pub reattached: Vec<i64>,
    /// 没有存活执行、标记为 error 的作业
    pub orphaned: Vec<i64>,
    pub recovery_duration_ms: u64,
    pub errors: Vec<String>,
}

/// 重启恢复
///
/// 从快照恢复仓储内容，再把重启前处于 `running` 的作业与执行层核对。
pub struct RecoveryService {
    lifecycle: Arc<JobLifecycle>,
    workflows: Arc<dyn WorkflowRepository>,
    capacity: Arc<CapacityRegistry>,
    launcher: Arc<dyn ExecutionLauncher>,
}

impl RecoveryService {
    pub fn new(
        lifecycle: Arc<JobLifecycle>,
        workflows: Arc<dyn WorkflowRepository>,
        capacity: Arc<CapacityRegistry>,
        launcher: Arc<dyn ExecutionLauncher>,
    ) -> Self {
        Self {
            lifecycle,
            workflows,
            capacity,
            launcher,
        }
    }

    /// 将快照内容写回仓储
    pub async fn restore(&self, snapshot: StateSnapshot) -> SchedulerResult<()> {
        let (jobs, workflows, transitions) = (
            snapshot.jobs.len(),
            snapshot.workflow_jobs.len(),
            snapshot.transitions.len(),
        );
        self.lifecycle.jobs().restore(snapshot.jobs).await?;
        self.workflows.restore_jobs(snapshot.workflow_jobs).await?;
        self.lifecycle.audit().restore(snapshot.transitions).await?;
        info!(
            "已从快照恢复 {} 个作业, {} 个工作流, {} 条审计记录",
            jobs, workflows, transitions
        );
        Ok(())
    }

    /// 核对 `running` 作业
    ///
    /// 执行层确认存活且实例容量足够的作业重新占用容量；其余作业以
    /// `OrphanedOnRestart` 标记为 error。实例应在调用前完成注册。
    pub async fn reconcile(&self) -> SchedulerResult<RecoveryReport> {
        info!("开始核对重启前运行中的作业");
        let started = Instant::now();
        let mut report = RecoveryReport::default();

        let running = self
            .lifecycle
            .jobs()
            .list_by_status(JobStatus::Running)
            .await?;

        for candidate in running {
            let _guard = self.lifecycle.lock(candidate.id).await;
            let mut job = self.lifecycle.get(candidate.id).await?;
            if !job.is_running() {
                continue;
            }

            let alive = match self.launcher.is_alive(job.id).await {
                Ok(alive) => alive,
                Err(e) => {
                    warn!("查询作业 {} 的执行状态失败: {}", job.id, e);
                    report.errors.push(format!("作业 {}: {}", job.id, e));
                    false
                }
            };

            let reserved = match (alive, job.instance_id.as_deref()) {
                (true, Some(instance_id)) => {
                    match self.capacity.reserve(instance_id, job.capacity_units).await {
                        Ok(Reservation::Granted { .. }) => true,
                        Ok(other) => {
                            warn!("作业 {} 无法在实例 {} 上重新占用容量: {:?}", job.id, instance_id, other);
                            false
                        }
                        Err(e) => {
                            warn!("作业 {} 的实例 {} 不可用: {}", job.id, instance_id, e);
                            false
                        }
                    }
                }
                _ => false,
            };

            if reserved {
                info!("作业 {} 仍在运行，已重新占用容量", job.id);
                report.reattached.push(job.id);
                continue;
            }

            // 执行层仍在跑但容量已无法占用，先让执行层停下，避免超出实例容量
            if alive {
                if let Some(instance_id) = job.instance_id.as_deref() {
                    if let Err(e) = self.launcher.cancel(job.id, instance_id).await {
                        warn!("通知实例 {} 停止作业 {} 失败: {}", instance_id, job.id, e);
                        report.errors.push(format!("作业 {}: {}", job.id, e));
                    }
                }
            }

            // 未占用容量，结束时不应再释放
            let instance_id = job.instance_id.take();
            StructuredLogger::log_orphan_reconciled(job.id, instance_id.as_deref());
            let job_id = job.id;
            match self
                .lifecycle
                .transition_locked(
                    job,
                    JobStatus::Error,
                    Some(StatusReason::OrphanedOnRestart),
                    None,
                )
                .await
            {
                Ok(_) => report.orphaned.push(job_id),
                Err(e) => {
                    error!("标记孤儿作业 {} 失败: {}", job_id, e);
                    report.errors.push(format!("作业 {job_id}: {e}"));
                }
            }
        }

        report.recovery_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "核对完成: {} 个作业继续运行, {} 个作业标记为孤儿, 耗时 {}ms",
            report.reattached.len(),
            report.orphaned.len(),
            report.recovery_duration_ms
        );
        Ok(report)
    }

    /// 当前状态的快照
    pub async fn snapshot(&self) -> SchedulerResult<StateSnapshot> {
        Ok(StateSnapshot::new(
            self.lifecycle.jobs().list_all().await?,
            self.workflows.list_all_jobs().await?,
            self.lifecycle.audit().all().await?,
        ))
    }
}
